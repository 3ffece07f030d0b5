use std::collections::VecDeque;
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::LentraError;
use crate::evaluation::EvaluationResult;
use crate::prompt::ModelResponse;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// One prompt, its responses and, once scored, its evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exchange {
    pub id: Uuid,
    pub prompt: String,
    pub model_ids: Vec<String>,
    pub responses: Vec<ModelResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
    pub timestamp: DateTime<Utc>,
}

/// Non-zero number of exchanges kept in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCapacity(NonZeroUsize);

impl HistoryCapacity {
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for HistoryCapacity {
    fn default() -> Self {
        Self(NonZeroUsize::MIN.saturating_add(DEFAULT_HISTORY_CAPACITY - 1))
    }
}

impl TryFrom<usize> for HistoryCapacity {
    type Error = LentraError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        let Some(size) = NonZeroUsize::new(value) else {
            return Err(LentraError::validation(
                "history capacity must be greater than 0",
            ));
        };
        Ok(Self(size))
    }
}

/// FIFO ring of exchanges; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct ExchangeHistory {
    entries: VecDeque<Exchange>,
    capacity: HistoryCapacity,
}

impl ExchangeHistory {
    pub fn new(capacity: HistoryCapacity) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `exchange`, returning the evicted entry if the ring was full.
    pub fn push(&mut self, exchange: Exchange) -> Option<Exchange> {
        let evicted = if self.entries.len() >= self.capacity.get() {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(exchange);
        evicted
    }

    /// The most recent `limit` exchanges, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Exchange> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries.range(start..).cloned().collect()
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Exchange> {
        self.entries.iter_mut().find(|exchange| exchange.id == id)
    }
}
