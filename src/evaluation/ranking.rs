use std::cmp::Ordering;

use super::types::EvaluationScore;

/// Ranked order of scored models, best first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    pub order: Vec<String>,
    pub winner: Option<String>,
    pub is_tie: bool,
}

/// Stable sort by descending final score, then ascending latency.
///
/// When the top two agree on both, there is a tie and no winner. `latencies`
/// is parallel to `scores`.
pub fn rank(scores: &[EvaluationScore], latencies: &[u64]) -> Ranking {
    let mut entries: Vec<(&EvaluationScore, u64)> = scores
        .iter()
        .zip(latencies.iter().copied().chain(std::iter::repeat(u64::MAX)))
        .collect();
    entries.sort_by(|(a, a_ms), (b, b_ms)| compare(a, *a_ms, b, *b_ms));

    let is_tie = match (entries.first(), entries.get(1)) {
        (Some((a, a_ms)), Some((b, b_ms))) => {
            compare(a, *a_ms, b, *b_ms) == Ordering::Equal
        }
        _ => false,
    };
    let winner = if is_tie {
        None
    } else {
        entries.first().map(|(score, _)| score.model_id.clone())
    };

    Ranking {
        order: entries
            .into_iter()
            .map(|(score, _)| score.model_id.clone())
            .collect(),
        winner,
        is_tie,
    }
}

fn compare(a: &EvaluationScore, a_ms: u64, b: &EvaluationScore, b_ms: u64) -> Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| a_ms.cmp(&b_ms))
}
