use thiserror::Error;
use uuid::Uuid;

/// Reasons an evaluation could not produce a result.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    /// Every candidate response carried an error tag
    #[error("no scorable responses")]
    NoResponses,
    /// Judge reply could not be read
    #[error("judge reply could not be parsed: {0}")]
    JudgeParse(String),
    #[error("embedding_similarity mode requires an embedder")]
    MissingEmbedder,
    #[error("llm_judge mode requires a judge model")]
    MissingJudge,
    /// The embedding collaborator failed
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("invalid ensemble: {0}")]
    InvalidEnsemble(String),
    #[error("invalid weights: {0}")]
    InvalidWeights(String),
    #[error("ballot not found: {0}")]
    BallotNotFound(Uuid),
    #[error("ballot expired: {0}")]
    BallotExpired(Uuid),
    #[error("ballot {ballot_id} has no option {option}")]
    UnknownOption { ballot_id: Uuid, option: usize },
}
