use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prompt::{ErrorTag, ModelResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    StreamStart,
    StreamChunk,
    StreamEnd,
    StreamError,
    Ping,
    Pong,
}

/// One outbound event: `{type, request_id, payload, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEnvelope {
    #[serde(rename = "type")]
    pub kind: StreamEventType,
    pub request_id: Uuid,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    pub model_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub model_id: String,
    pub chunk: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
}

/// Error scoped to one model, or to the whole request when `model_id` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndPayload {
    pub responses: Vec<ModelResponse>,
    pub total_latency_ms: u64,
}

impl StreamEnvelope {
    pub fn new(kind: StreamEventType, request_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            kind,
            request_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn start(request_id: Uuid, payload: &StartPayload) -> Self {
        Self::new(StreamEventType::StreamStart, request_id, to_value(payload))
    }

    pub fn chunk(request_id: Uuid, payload: &ChunkPayload) -> Self {
        Self::new(StreamEventType::StreamChunk, request_id, to_value(payload))
    }

    pub fn error(request_id: Uuid, payload: &ErrorPayload) -> Self {
        Self::new(StreamEventType::StreamError, request_id, to_value(payload))
    }

    pub fn end(request_id: Uuid, payload: &EndPayload) -> Self {
        Self::new(StreamEventType::StreamEnd, request_id, to_value(payload))
    }

    pub fn pong(request_id: Uuid) -> Self {
        Self::new(StreamEventType::Pong, request_id, serde_json::Value::Null)
    }

    /// Decodes the payload as `T`, e.g. [`ChunkPayload`] for chunk events.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

fn to_value<T: Serialize>(payload: &T) -> serde_json::Value {
    serde_json::to_value(payload).unwrap_or_else(|err| {
        log::error!("failed to encode stream payload error={err}");
        serde_json::Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_type_field() {
        let envelope = StreamEnvelope::chunk(
            Uuid::nil(),
            &ChunkPayload {
                model_id: "a".to_string(),
                chunk: "he".to_string(),
                done: false,
                token_count: None,
            },
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "stream_chunk");
        assert_eq!(json["payload"]["model_id"], "a");
        assert!(json["payload"].get("token_count").is_none());
    }
}
