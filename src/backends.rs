//! Concrete adapters behind the [`crate::gateway`] traits.

#[cfg(feature = "ollama")]
#[path = "backends/ndjson.rs"]
mod ndjson;

#[cfg(feature = "ollama")]
#[path = "backends/ollama.rs"]
pub mod ollama;
