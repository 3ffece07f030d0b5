use std::time::Duration;

const DEFAULT_PER_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_GLOBAL_SLACK: Duration = Duration::from_secs(5);
const DEFAULT_RAG_TOP_K: usize = 5;
const DEFAULT_RAG_THRESHOLD: f64 = 0.3;

/// Deadlines and retrieval defaults for [`super::RequestCoordinator`].
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Budget for a single model call.
    pub per_call_timeout: Duration,
    /// Added to `per_call_timeout` to bound the whole fan-out.
    pub global_slack: Duration,
    pub rag_top_k: usize,
    pub rag_score_threshold: f64,
    pub rag_collection: Option<String>,
    /// Fail the request instead of degrading when retrieval fails.
    pub rag_required: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            per_call_timeout: DEFAULT_PER_CALL_TIMEOUT,
            global_slack: DEFAULT_GLOBAL_SLACK,
            rag_top_k: DEFAULT_RAG_TOP_K,
            rag_score_threshold: DEFAULT_RAG_THRESHOLD,
            rag_collection: None,
            rag_required: false,
        }
    }
}

impl CoordinatorConfig {
    /// Wall-clock bound on one request's fan-out.
    pub fn global_deadline(&self) -> Duration {
        self.per_call_timeout.saturating_add(self.global_slack)
    }
}
