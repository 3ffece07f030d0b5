use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use crate::coordinator::DispatchOutcome;
use crate::error::LentraError;
use crate::evaluation::EvaluationResult;
use crate::prompt::{ModelResponse, PromptRequest};

use super::exchange::{Exchange, ExchangeHistory, HistoryCapacity};

/// Turns coordinator output into [`Exchange`]s and appends them to the
/// shared history. Appends are serialized through one lock so concurrent
/// requests never lose entries.
#[derive(Debug)]
pub struct ResponseAggregator {
    history: Mutex<ExchangeHistory>,
}

impl Default for ResponseAggregator {
    fn default() -> Self {
        Self::new(HistoryCapacity::default())
    }
}

impl ResponseAggregator {
    pub fn new(capacity: HistoryCapacity) -> Self {
        Self {
            history: Mutex::new(ExchangeHistory::new(capacity)),
        }
    }

    /// Records one exchange. `responses` must line up with the request's
    /// model list, position by position.
    pub fn aggregate(
        &self,
        request: &PromptRequest,
        responses: Vec<ModelResponse>,
        evaluation: Option<EvaluationResult>,
    ) -> Result<Exchange, LentraError> {
        self.record(Uuid::new_v4(), request, responses, evaluation)
    }

    /// Records a dispatch under its own request id.
    pub fn aggregate_outcome(
        &self,
        request: &PromptRequest,
        outcome: &DispatchOutcome,
    ) -> Result<Exchange, LentraError> {
        self.record(
            outcome.request_id,
            request,
            outcome.responses.clone(),
            None,
        )
    }

    /// Attaches a later evaluation to a stored exchange. Returns `false` when
    /// the exchange has already been evicted.
    pub fn attach_evaluation(
        &self,
        exchange_id: Uuid,
        evaluation: EvaluationResult,
    ) -> Result<bool, LentraError> {
        let mut history = self.lock()?;
        match history.get_mut(exchange_id) {
            Some(exchange) => {
                exchange.evaluation = Some(evaluation);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<Exchange>, LentraError> {
        Ok(self.lock()?.recent(limit))
    }

    pub fn len(&self) -> Result<usize, LentraError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LentraError> {
        Ok(self.lock()?.is_empty())
    }

    pub fn capacity(&self) -> Result<usize, LentraError> {
        Ok(self.lock()?.capacity())
    }

    fn record(
        &self,
        id: Uuid,
        request: &PromptRequest,
        responses: Vec<ModelResponse>,
        evaluation: Option<EvaluationResult>,
    ) -> Result<Exchange, LentraError> {
        check_alignment(&request.model_ids, &responses)?;
        let exchange = Exchange {
            id,
            prompt: request.prompt.clone(),
            model_ids: request.model_ids.clone(),
            responses,
            evaluation,
            timestamp: Utc::now(),
        };

        let mut history = self.lock()?;
        if let Some(evicted) = history.push(exchange.clone()) {
            log::debug!("history full, evicted exchange id={}", evicted.id);
        }
        log::debug!(
            "exchange recorded id={} history_len={}",
            exchange.id,
            history.len()
        );
        Ok(exchange)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ExchangeHistory>, LentraError> {
        self.history.lock().map_err(|_| {
            log::error!("history lock poisoned");
            LentraError::aggregation("history store is unavailable")
        })
    }
}

fn check_alignment(model_ids: &[String], responses: &[ModelResponse]) -> Result<(), LentraError> {
    if model_ids.len() != responses.len() {
        return Err(LentraError::aggregation(format!(
            "expected {} responses, got {}",
            model_ids.len(),
            responses.len()
        )));
    }
    if let Some((idx, (expected, response))) = model_ids
        .iter()
        .zip(responses)
        .enumerate()
        .find(|(_, (expected, response))| **expected != response.model_id)
    {
        return Err(LentraError::aggregation(format!(
            "response {idx} is for {}, expected {expected}",
            response.model_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn request(models: &[&str]) -> PromptRequest {
        PromptRequest::new("hi", models.iter().copied())
    }

    fn responses(models: &[&str]) -> Vec<ModelResponse> {
        models
            .iter()
            .map(|id| ModelResponse::success(*id, "text", 10, 1))
            .collect()
    }

    #[test]
    fn keeps_request_order() {
        let aggregator = ResponseAggregator::default();
        let exchange = aggregator
            .aggregate(&request(&["b", "a"]), responses(&["b", "a"]), None)
            .unwrap();
        assert_eq!(exchange.responses[0].model_id, "b");
        assert_eq!(aggregator.len().unwrap(), 1);
    }

    #[test]
    fn rejects_misaligned_responses() {
        let aggregator = ResponseAggregator::default();
        let short = aggregator.aggregate(&request(&["a", "b"]), responses(&["a"]), None);
        assert!(matches!(short, Err(LentraError::Aggregation(_))));

        let swapped = aggregator.aggregate(&request(&["a", "b"]), responses(&["b", "a"]), None);
        assert!(matches!(swapped, Err(LentraError::Aggregation(_))));
        assert!(aggregator.is_empty().unwrap());
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let aggregator = ResponseAggregator::new(HistoryCapacity::try_from(3).unwrap());
        for _ in 0..5 {
            aggregator
                .aggregate(&request(&["a"]), responses(&["a"]), None)
                .unwrap();
        }
        assert_eq!(aggregator.len().unwrap(), 3);
        assert_eq!(aggregator.capacity().unwrap(), 3);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let aggregator = Arc::new(ResponseAggregator::new(
            HistoryCapacity::try_from(1_000).unwrap(),
        ));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        aggregator
                            .aggregate(&request(&["a"]), responses(&["a"]), None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(aggregator.len().unwrap(), 200);
    }

    #[test]
    fn poisoned_lock_is_an_aggregation_error() {
        let aggregator = Arc::new(ResponseAggregator::default());
        let poisoner = aggregator.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.history.lock().unwrap();
            panic!("poison the history lock");
        })
        .join();

        let result = aggregator.aggregate(&request(&["a"]), responses(&["a"]), None);
        assert!(matches!(result, Err(LentraError::Aggregation(_))));
    }
}
