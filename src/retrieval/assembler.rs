use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::chunk::{RetrievalError, RetrievedChunk, Retriever};

/// Separator placed between chunks in the assembled context.
pub const CONTEXT_DELIMITER: &str = "\n\n";
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 8_000;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub query: String,
    pub top_k: usize,
    pub score_threshold: f64,
    pub collection: Option<String>,
}

/// Ranked chunks plus the context string built from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieval {
    pub chunks: Vec<RetrievedChunk>,
    pub context: String,
    pub latency_ms: u64,
}

/// Wraps a [`Retriever`] and enforces the retrieval contract: chunks at or
/// above the threshold, sorted by descending score, at most `top_k` of them,
/// and a context no longer than the configured maximum.
pub struct RetrievalAssembler {
    retriever: Arc<dyn Retriever>,
    max_context_chars: usize,
}

impl RetrievalAssembler {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn max_context_chars(mut self, max_chars: usize) -> Self {
        self.max_context_chars = max_chars;
        self
    }

    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<Retrieval, RetrievalError> {
        let started = Instant::now();
        let raw = self.retriever.search(query).await?;
        let chunks = rank_chunks(raw, query.top_k, query.score_threshold);
        let context = assemble_context(&chunks, self.max_context_chars);
        let latency_ms = started.elapsed().as_millis() as u64;
        log::debug!(
            "retrieval finished chunks={} context_chars={} latency_ms={latency_ms}",
            chunks.len(),
            context.chars().count()
        );
        Ok(Retrieval {
            chunks,
            context,
            latency_ms,
        })
    }
}

fn rank_chunks(raw: Vec<RetrievedChunk>, top_k: usize, threshold: f64) -> Vec<RetrievedChunk> {
    let mut chunks: Vec<RetrievedChunk> = raw
        .into_iter()
        .filter(|chunk| chunk.score.is_finite() && chunk.score >= threshold)
        .collect();
    chunks.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    chunks.truncate(top_k);
    chunks
}

/// Joins chunk contents in order, labelled by source position, stopping before
/// the first chunk that would push the result past `max_chars`. If even the
/// first chunk is too long it is cut at `max_chars`.
pub fn assemble_context(chunks: &[RetrievedChunk], max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for (idx, chunk) in chunks.iter().enumerate() {
        let part = format!("[Source {}]: {}", idx + 1, chunk.content);
        let separator = if out.is_empty() { 0 } else { CONTEXT_DELIMITER.len() };
        let cost = separator + part.chars().count();
        if used + cost > max_chars {
            if out.is_empty() {
                out = part.chars().take(max_chars).collect();
            }
            break;
        }
        if separator > 0 {
            out.push_str(CONTEXT_DELIMITER);
        }
        out.push_str(&part);
        used += cost;
    }
    out
}
