//! Resumable pipeline orchestration
//!
//! A run walks five stages in a fixed order, persisting its position and
//! every intermediate artifact so that an interrupted run picks up where
//! it stopped without repeating work or re-asking answered questions.

mod context;
mod orchestrator;
mod review;
mod state;

pub use context::PipelineContext;
pub use orchestrator::PipelineOrchestrator;
pub use review::{
    AutoAcceptHandler, FieldOverrides, ReviewDecision, ReviewHandler, ReviewRequest,
};
pub use state::{PipelineState, RunStatus, Stage};
