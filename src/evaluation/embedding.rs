use async_trait::async_trait;

use super::error::EvaluationError;
use super::heuristic;
use super::types::{Candidate, EvaluationScore, ScoreWeights};

/// Computes embeddings for a batch of texts, one vector per input, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EvaluationError>;
}

/// Cosine similarity in `[-1, 1]`. Zero-length or zero vectors give `0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, EvaluationError> {
    if a.len() != b.len() {
        return Err(EvaluationError::Embedding(format!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Relevance is the similarity to `anchor` rescaled to `[0, 1]`; clarity
/// reuses the heuristic structure signal; risk is `1 - relevance`.
pub(crate) async fn score(
    embedder: &dyn Embedder,
    anchor: &str,
    candidates: &[Candidate<'_>],
    weights: &ScoreWeights,
) -> Result<Vec<EvaluationScore>, EvaluationError> {
    let mut texts = Vec::with_capacity(candidates.len() + 1);
    texts.push(anchor.to_string());
    texts.extend(candidates.iter().map(|c| c.text.to_string()));

    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != texts.len() {
        return Err(EvaluationError::Embedding(format!(
            "expected {} embeddings, got {}",
            texts.len(),
            vectors.len()
        )));
    }

    let (anchor_vec, response_vecs) = vectors.split_at(1);
    candidates
        .iter()
        .zip(response_vecs)
        .map(|(candidate, vector)| {
            let similarity = cosine_similarity(&anchor_vec[0], vector)?;
            let relevance = (similarity + 1.0) / 2.0;
            Ok(EvaluationScore::from_components(
                candidate.model_id,
                relevance,
                heuristic::clarity(candidate.text),
                1.0 - relevance,
                weights,
                Some(format!("Embedding similarity {similarity:.3}")),
            ))
        })
        .collect()
}
