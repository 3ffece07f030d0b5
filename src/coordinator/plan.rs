use crate::error::GatewayError;
use crate::prompt::{ErrorTag, ModelResponse};

/// Maps the requested model list onto one task per distinct model id.
///
/// `slots[i]` is the task index serving position `i` of the request, so a
/// model id listed twice is generated once and copied into both positions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DispatchPlan {
    distinct: Vec<String>,
    slots: Vec<usize>,
}

impl DispatchPlan {
    pub(crate) fn new(model_ids: &[String]) -> Self {
        let mut distinct: Vec<String> = Vec::with_capacity(model_ids.len());
        let mut slots = Vec::with_capacity(model_ids.len());
        for id in model_ids {
            let task = match distinct.iter().position(|known| known == id) {
                Some(task) => task,
                None => {
                    distinct.push(id.clone());
                    distinct.len() - 1
                }
            };
            slots.push(task);
        }
        Self { distinct, slots }
    }

    pub(crate) fn tasks(&self) -> &[String] {
        &self.distinct
    }

    /// Spreads per-task results back over the request positions.
    pub(crate) fn expand(&self, results: &[ModelResponse]) -> Vec<ModelResponse> {
        self.slots
            .iter()
            .map(|&task| results[task].clone())
            .collect()
    }
}

/// Why one model's slot ended without text.
#[derive(Debug)]
pub(crate) enum SlotFailure {
    Timeout,
    Cancelled,
    Adapter(String),
}

impl From<GatewayError> for SlotFailure {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Cancelled => SlotFailure::Cancelled,
            other => SlotFailure::Adapter(other.to_string()),
        }
    }
}

impl SlotFailure {
    pub(crate) fn tag(&self) -> ErrorTag {
        match self {
            SlotFailure::Timeout => ErrorTag::Timeout,
            SlotFailure::Cancelled => ErrorTag::Cancelled,
            SlotFailure::Adapter(_) => ErrorTag::AdapterError,
        }
    }

    pub(crate) fn detail(&self) -> String {
        match self {
            SlotFailure::Timeout => "per-call deadline exceeded".to_string(),
            SlotFailure::Cancelled => "call cancelled".to_string(),
            SlotFailure::Adapter(message) => message.clone(),
        }
    }

    pub(crate) fn into_response(self, model_id: &str, latency_ms: u64) -> ModelResponse {
        ModelResponse::failure(model_id, self.tag(), latency_ms, Some(self.detail()))
    }
}

/// How a slot that never received a task result gets filled.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Unfilled {
    /// The fan-out was interrupted by a deadline or the caller.
    Cancelled,
    /// The task ended without reporting, e.g. it panicked.
    Crashed,
}

impl Unfilled {
    pub(crate) fn response(self, model_id: &str, elapsed_ms: u64) -> ModelResponse {
        match self {
            Unfilled::Cancelled => ModelResponse::failure(
                model_id,
                ErrorTag::Cancelled,
                elapsed_ms,
                Some("request deadline reached or request cancelled".to_string()),
            ),
            Unfilled::Crashed => ModelResponse::failure(
                model_id,
                ErrorTag::AdapterError,
                elapsed_ms,
                Some("generation task ended without a result".to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicates_share_one_task() {
        let plan = DispatchPlan::new(&ids(&["a", "b", "a"]));
        assert_eq!(plan.tasks(), &ids(&["a", "b"])[..]);

        let results = vec![
            ModelResponse::success("a", "A", 10, 1),
            ModelResponse::success("b", "B", 20, 1),
        ];
        let expanded = plan.expand(&results);
        let order: Vec<_> = expanded.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "A"]);
    }

    #[test]
    fn gateway_cancellation_maps_to_cancelled_tag() {
        assert_eq!(
            SlotFailure::from(GatewayError::Cancelled).tag(),
            ErrorTag::Cancelled
        );
        assert_eq!(
            SlotFailure::from(GatewayError::ProviderError("boom".into())).tag(),
            ErrorTag::AdapterError
        );
    }
}
