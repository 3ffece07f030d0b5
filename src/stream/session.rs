use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of one streamed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("stream {request_id} cannot move from {from:?} to {to:?}")]
pub struct StreamStateError {
    pub request_id: Uuid,
    pub from: StreamState,
    pub to: StreamState,
}

/// Guards the `idle -> streaming -> closed` transitions for a request id.
#[derive(Debug)]
pub struct StreamSession {
    request_id: Uuid,
    state: StreamState,
}

impl StreamSession {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: StreamState::Idle,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn begin(&mut self) -> Result<(), StreamStateError> {
        self.transition(StreamState::Idle, StreamState::Streaming)
    }

    pub fn close(&mut self) -> Result<(), StreamStateError> {
        self.transition(StreamState::Streaming, StreamState::Closed)
    }

    fn transition(&mut self, from: StreamState, to: StreamState) -> Result<(), StreamStateError> {
        if self.state != from {
            return Err(StreamStateError {
                request_id: self.request_id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_idle_streaming_closed() {
        let mut session = StreamSession::new(Uuid::nil());
        assert_eq!(session.state(), StreamState::Idle);
        session.begin().unwrap();
        assert_eq!(session.state(), StreamState::Streaming);
        session.close().unwrap();
        assert_eq!(session.state(), StreamState::Closed);
    }

    #[test]
    fn rejects_out_of_order_transitions() {
        let mut session = StreamSession::new(Uuid::nil());
        assert!(session.close().is_err());
        session.begin().unwrap();
        assert!(session.begin().is_err());
        session.close().unwrap();
        assert!(session.close().is_err());
    }
}
