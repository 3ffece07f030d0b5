//! Scoring and ranking of model responses under interchangeable modes.
//!
//! Every mode is a variant of [`EvaluationMode`] mapped to a scoring
//! function; [`EvaluationEngine`] picks the function, applies the weights and
//! ranks the result. Error-tagged responses are never scored.

#[path = "evaluation/types.rs"]
mod types;

#[path = "evaluation/error.rs"]
mod error;

#[path = "evaluation/heuristic.rs"]
pub mod heuristic;

#[path = "evaluation/embedding.rs"]
mod embedding;

#[path = "evaluation/judge.rs"]
mod judge;

#[path = "evaluation/ensemble.rs"]
mod ensemble;

#[path = "evaluation/ranking.rs"]
mod ranking;

#[path = "evaluation/ballot.rs"]
mod ballot;

#[path = "evaluation/engine.rs"]
mod engine;

pub use ballot::{BallotBox, BallotOption, BallotView, DEFAULT_BALLOT_TTL_HOURS};
pub use embedding::{cosine_similarity, Embedder};
pub use engine::EvaluationEngine;
pub use ensemble::{EnsembleComponent, EnsembleConfig};
pub use error::EvaluationError;
pub use judge::{JudgeSettings, DEFAULT_JUDGE_MAX_TOKENS, DEFAULT_JUDGE_TEMPERATURE};
pub use ranking::{rank, Ranking};
pub use types::{
    EvaluationMode, EvaluationRequest, EvaluationResult, EvaluationScore, ScoreWeights,
};
