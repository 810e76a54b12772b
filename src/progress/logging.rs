//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { archive, run_id } => {
                info!(archive = %archive, run_id = %run_id, "Starting pipeline run");
            }
            ProgressEvent::StageStarted { stage } => {
                info!(stage = %stage, "Starting stage");
            }
            ProgressEvent::StageComplete { stage, duration } => {
                info!(
                    stage = %stage,
                    duration_ms = duration.as_millis(),
                    "Stage complete"
                );
            }
            ProgressEvent::ContactProgress {
                stage,
                processed,
                total,
            } => {
                debug!(
                    stage = %stage,
                    progress = format!("{}/{}", processed, total),
                    "Contact progress"
                );
            }
            ProgressEvent::ReviewRequested {
                address,
                confidence,
            } => {
                info!(
                    address = %address,
                    confidence,
                    "Classification below threshold, requesting review"
                );
            }
            ProgressEvent::LlmCallComplete {
                address,
                success,
                response_time,
            } => {
                if *success {
                    debug!(
                        address = %address,
                        response_time_ms = response_time.as_millis(),
                        "LLM call complete"
                    );
                } else {
                    warn!(
                        address = %address,
                        response_time_ms = response_time.as_millis(),
                        "LLM call failed, treating as no contribution"
                    );
                }
            }
            ProgressEvent::Completed {
                confirmed,
                unassigned,
                spam,
                total_time,
            } => {
                info!(
                    confirmed,
                    unassigned,
                    spam,
                    total_time_ms = total_time.as_millis(),
                    "Pipeline run complete"
                );
            }
            ProgressEvent::Failed { stage, error } => {
                warn!(stage = %stage, error = %error, "Pipeline run failed");
            }
        }
    }
}
