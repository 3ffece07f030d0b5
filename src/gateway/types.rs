use std::pin::Pin;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::prompt::ResolvedParams;

/// What every adapter receives: the fully composed prompt plus parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub params: ResolvedParams,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            params: ResolvedParams::default(),
        }
    }
}

/// A finished, non-streamed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub token_count: u32,
    /// Backend-reported processing time, when the backend exposes one.
    pub latency_ms: Option<u64>,
}

/// One incremental piece of streamed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenChunk {
    pub text: String,
    /// Set on the last chunk of a model's output.
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

impl TokenChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
            token_count: None,
        }
    }

    pub fn done(token_count: Option<u32>) -> Self {
        Self {
            text: String::new(),
            done: true,
            token_count,
        }
    }
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<TokenChunk, GatewayError>> + Send>>;

/// Read-only model metadata for the catalog endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Turns a finished generation into a one-chunk stream for backends that
/// cannot stream.
pub fn single_chunk_stream(generation: Generation) -> TokenStream {
    let chunk = TokenChunk {
        text: generation.text,
        done: true,
        token_count: Some(generation.token_count),
    };
    Box::pin(stream::iter(vec![Ok(chunk)]))
}
