//! Progress handler trait and events

use std::time::Duration;

/// Events emitted during a pipeline run
///
/// Emitted for observability only; correctness never depends on them.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started
    Started { archive: String, run_id: String },

    /// A pipeline stage began
    StageStarted { stage: String },

    /// A pipeline stage finished
    StageComplete { stage: String, duration: Duration },

    /// Periodic per-contact progress inside a stage
    ContactProgress {
        stage: String,
        processed: usize,
        total: usize,
    },

    /// A contact fell below the review threshold and awaits a decision
    ReviewRequested { address: String, confidence: f64 },

    /// An LLM call completed (or degraded to no-contribution)
    LlmCallComplete {
        address: String,
        success: bool,
        response_time: Duration,
    },

    /// Run finished with a complete export partition
    Completed {
        confirmed: usize,
        unassigned: usize,
        spam: usize,
        total_time: Duration,
    },

    /// Run failed at the named stage
    Failed { stage: String, error: String },
}

/// Trait for handling progress events during a run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}
