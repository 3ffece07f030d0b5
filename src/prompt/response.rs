use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a model slot carries no usable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    Timeout,
    AdapterError,
    Cancelled,
}

impl ErrorTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorTag::Timeout => "timeout",
            ErrorTag::AdapterError => "adapter_error",
            ErrorTag::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome for one requested model, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model_id: String,
    /// Generated text; empty when `error` is set.
    pub text: String,
    pub latency_ms: u64,
    pub token_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,
    /// Adapter message kept for logs and clients; never scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ModelResponse {
    pub fn success(
        model_id: impl Into<String>,
        text: impl Into<String>,
        latency_ms: u64,
        token_count: u32,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            text: text.into(),
            latency_ms,
            token_count,
            error: None,
            error_detail: None,
        }
    }

    pub fn failure(
        model_id: impl Into<String>,
        tag: ErrorTag,
        latency_ms: u64,
        detail: Option<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            text: String::new(),
            latency_ms,
            token_count: 0,
            error: Some(tag),
            error_detail: detail,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
