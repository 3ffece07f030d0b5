use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::gateway::{GenerationRequest, ModelGateway};
use crate::prompt::ModelResponse;

use super::plan::{SlotFailure, Unfilled};

/// Deadlines applied to one fan-out.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadlines {
    pub(crate) per_call: Duration,
    pub(crate) global: Duration,
}

/// Runs one generation task per model id and returns their responses in
/// `model_ids` order, whatever order they completed in.
///
/// Slots still open when the global deadline passes or `cancel` fires are
/// filled with `cancelled` responses after the running calls are signalled.
pub(crate) async fn fan_out(
    gateway: Arc<dyn ModelGateway>,
    model_ids: &[String],
    request: Arc<GenerationRequest>,
    deadlines: Deadlines,
    cancel: CancellationToken,
) -> Vec<ModelResponse> {
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for (idx, model_id) in model_ids.iter().enumerate() {
        tasks.spawn(run_model(
            gateway.clone(),
            idx,
            model_id.clone(),
            request.clone(),
            deadlines.per_call,
            cancel.child_token(),
        ));
    }

    let mut slots: Vec<Option<ModelResponse>> = vec![None; model_ids.len()];
    let global = sleep(deadlines.global);
    tokio::pin!(global);

    let interrupted = loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok((idx, response))) => slots[idx] = Some(response),
                Some(Err(err)) => log::error!("generation task failed error={err}"),
                None => break false,
            },
            _ = &mut global => {
                log::warn!(
                    "global deadline reached pending={} deadline_ms={}",
                    tasks.len(),
                    deadlines.global.as_millis()
                );
                break true;
            }
            _ = cancel.cancelled() => {
                log::info!("fan-out cancelled pending={}", tasks.len());
                break true;
            }
        }
    };

    if interrupted {
        cancel.cancel();
        tasks.abort_all();
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let fallback = if interrupted {
        Unfilled::Cancelled
    } else {
        Unfilled::Crashed
    };
    slots
        .into_iter()
        .zip(model_ids)
        .map(|(slot, model_id)| slot.unwrap_or_else(|| fallback.response(model_id, elapsed_ms)))
        .collect()
}

async fn run_model(
    gateway: Arc<dyn ModelGateway>,
    idx: usize,
    model_id: String,
    request: Arc<GenerationRequest>,
    per_call: Duration,
    cancel: CancellationToken,
) -> (usize, ModelResponse) {
    let started = Instant::now();
    let call_token = cancel.child_token();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SlotFailure::Cancelled),
        result = timeout(per_call, gateway.generate(&model_id, &request, call_token.clone())) => {
            match result {
                Ok(generation) => generation.map_err(SlotFailure::from),
                Err(_) => {
                    call_token.cancel();
                    Err(SlotFailure::Timeout)
                }
            }
        }
    };

    let latency_ms = started.elapsed().as_millis() as u64;
    let response = match outcome {
        Ok(generation) => {
            log::debug!(
                "model finished model_id={model_id} latency_ms={latency_ms} tokens={}",
                generation.token_count
            );
            ModelResponse::success(
                model_id.as_str(),
                generation.text,
                latency_ms,
                generation.token_count,
            )
        }
        Err(failure) => {
            log::warn!(
                "model failed model_id={model_id} error={} detail={}",
                failure.tag(),
                failure.detail()
            );
            failure.into_response(&model_id, latency_ms)
        }
    };
    (idx, response)
}
