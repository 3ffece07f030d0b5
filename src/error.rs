use thiserror::Error;

use crate::evaluation::EvaluationError;
use crate::retrieval::RetrievalError;
use crate::stream::StreamStateError;

/// Errors raised by model adapters and the gateway in front of them.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    HttpError(String),
    /// Invalid request parameters or format
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Errors returned by the backend
    #[error("Provider error: {0}")]
    ProviderError(String),
    /// Backend response could not be understood
    #[error("Response format error: {message}. Raw response: {raw_response}")]
    ResponseFormatError {
        message: String,
        raw_response: String,
    },
    /// JSON serialization/deserialization errors
    #[error("JSON parse error: {0}")]
    JsonError(String),
    /// No adapter can serve the requested model id
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    /// Adapter could not be initialised
    #[error("Adapter load failed for {model_id}: {reason}")]
    LoadFailed { model_id: String, reason: String },
    /// The call observed its cancellation token
    #[error("Call cancelled")]
    Cancelled,
    /// Retry attempts exceeded
    #[error("Retry attempts exceeded after {attempts} tries: {last_error}")]
    RetryExceeded { attempts: usize, last_error: String },
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::JsonError(format!(
            "{} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}

/// Errors surfaced to callers of the orchestration core.
#[derive(Debug, Error)]
pub enum LentraError {
    /// Request rejected before dispatch
    #[error("Validation error: {0}")]
    Validation(String),
    /// Retrieval failed while it was mandatory
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),
    /// Scoring could not produce a result
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),
    /// History could not record the exchange
    #[error("Aggregation error: {0}")]
    Aggregation(String),
    /// Gateway failure outside of a per-model slot
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
    /// A stream session was driven out of order
    #[error("Stream error: {0}")]
    Stream(#[from] StreamStateError),
}

impl LentraError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        LentraError::Validation(msg.into())
    }

    pub(crate) fn aggregation(msg: impl Into<String>) -> Self {
        LentraError::Aggregation(msg.into())
    }
}
