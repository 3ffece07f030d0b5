//! Streaming multiplexer: merges per-model token streams for one request into
//! a single outbound envelope sequence.

#[path = "stream/event.rs"]
mod event;

#[path = "stream/session.rs"]
mod session;

#[path = "stream/multiplexer.rs"]
mod multiplexer;

pub use event::{ChunkPayload, EndPayload, ErrorPayload, StartPayload, StreamEnvelope, StreamEventType};
pub use multiplexer::StreamMultiplexer;
pub use session::{StreamSession, StreamState, StreamStateError};
