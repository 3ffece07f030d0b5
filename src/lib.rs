//! # lentra
//!
//! Send one prompt to several text-generation backends at once, optionally
//! grounded with retrieved context, and rank what comes back.
//!
//! The crate is organised leaf-first:
//!
//! - [`gateway`]: the uniform adapter surface over heterogeneous backends and
//!   the warmed-adapter pool.
//! - [`retrieval`]: the contract consumed from the retrieval assembler and the
//!   deterministic context assembly on top of it.
//! - [`coordinator`]: validation, fan-out with per-call and global deadlines,
//!   and order-stable fan-in.
//! - [`stream`]: the per-request streaming multiplexer.
//! - [`history`]: the response aggregator and its bounded exchange ring.
//! - [`evaluation`]: scoring and ranking under interchangeable modes.
//!
//! [`backends`] holds the Ollama adapter and [`config`] the TOML service
//! configuration. The `api` feature adds the axum transport in `api`.

pub mod backends;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod evaluation;
pub mod gateway;
pub mod history;
pub mod prompt;
pub mod retrieval;
pub mod stream;

#[cfg(feature = "api")]
pub mod api;

#[cfg(feature = "logging")]
pub mod logging;

#[cfg(test)]
mod test_support;

pub use coordinator::{
    AssembledContext, ContextSource, CoordinatorConfig, DispatchOutcome, RequestCoordinator,
};
pub use error::{GatewayError, LentraError};
pub use evaluation::{
    EvaluationEngine, EvaluationMode, EvaluationRequest, EvaluationResult, EvaluationScore,
    ScoreWeights,
};
pub use gateway::{AdapterPool, ModelAdapter, ModelGateway};
pub use history::{Exchange, ResponseAggregator};
pub use prompt::{ErrorTag, GenerationParams, ModelResponse, Persona, PromptRequest, RagParams};
pub use stream::{StreamEnvelope, StreamEventType, StreamMultiplexer, StreamSession};
