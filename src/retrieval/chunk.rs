use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::assembler::RetrievalQuery;

/// Errors reported by the retrieval collaborator.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("retrieval backend failed: {0}")]
    Backend(String),
    #[error("collection not found: {0}")]
    UnknownCollection(String),
    #[error("no retriever configured")]
    NotConfigured,
}

/// A retrievable unit of indexed document content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    /// Relevance in `[0, 1]`, higher is better.
    pub score: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RetrievedChunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score,
            metadata: BTreeMap::new(),
        }
    }
}

/// Search over an external index. Results may arrive in any order and may
/// exceed `top_k`; [`super::RetrievalAssembler`] normalises them.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}
