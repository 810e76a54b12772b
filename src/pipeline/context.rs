//! Pipeline context for managing dependencies

use super::review::ReviewHandler;
use crate::config::SiftboxConfig;
use crate::llm::LlmClient;
use crate::progress::ProgressHandler;
use crate::store::DocumentStore;
use std::sync::Arc;

/// Context that owns all long-lived pipeline dependencies
pub struct PipelineContext {
    pub config: SiftboxConfig,
    /// Persistence for every intermediate document
    pub store: DocumentStore,
    /// Absent when the run is regex-only (`--no-llm`)
    pub llm_client: Option<Arc<dyn LlmClient>>,
    pub review_handler: Arc<dyn ReviewHandler>,
    pub progress_handler: Arc<dyn ProgressHandler>,
}

impl PipelineContext {
    pub fn new(
        config: SiftboxConfig,
        store: DocumentStore,
        llm_client: Option<Arc<dyn LlmClient>>,
        review_handler: Arc<dyn ReviewHandler>,
        progress_handler: Arc<dyn ProgressHandler>,
    ) -> Self {
        Self {
            config,
            store,
            llm_client,
            review_handler,
            progress_handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::review::AutoAcceptHandler;
    use crate::progress::NoOpHandler;
    use tempfile::TempDir;

    #[test]
    fn test_context_without_llm() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let context = PipelineContext::new(
            SiftboxConfig::default(),
            store,
            None,
            Arc::new(AutoAcceptHandler),
            Arc::new(NoOpHandler),
        );
        assert!(context.llm_client.is_none());
    }
}
