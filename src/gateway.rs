//! The uniform call surface over text-generation backends.
//!
//! The core never talks to a backend directly: it holds an
//! `Arc<dyn ModelGateway>` and addresses models by id. [`AdapterPool`] is the
//! stock gateway, keeping one warmed [`ModelAdapter`] per model id.

#[path = "gateway/types.rs"]
mod types;

#[path = "gateway/traits.rs"]
mod traits;

#[path = "gateway/pool.rs"]
mod pool;

#[path = "gateway/resilient.rs"]
mod resilient;

pub use pool::AdapterPool;
pub use resilient::{ResilienceConfig, ResilientGateway};
pub use traits::{AdapterFactory, ModelAdapter, ModelGateway};
pub use types::{single_chunk_stream, Generation, GenerationRequest, ModelInfo, TokenChunk, TokenStream};
