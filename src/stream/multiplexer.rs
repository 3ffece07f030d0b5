use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::coordinator::fan_out::Deadlines;
use crate::coordinator::plan::{DispatchPlan, SlotFailure, Unfilled};
use crate::gateway::{GenerationRequest, ModelGateway, TokenChunk};
use crate::prompt::ModelResponse;

use super::event::{ChunkPayload, EndPayload, ErrorPayload, StartPayload, StreamEnvelope};
use super::session::{StreamSession, StreamStateError};

const EVENT_BUFFER: usize = 64;

/// What a per-model streaming task reports back to the multiplexer.
#[derive(Debug)]
enum ModelEvent {
    Chunk { task: usize, chunk: TokenChunk },
    Finished { task: usize, response: ModelResponse },
}

struct Collected {
    text: String,
    token_count: u32,
}

/// Merges the token streams of every model in one request into a single
/// envelope sequence on `sink`.
///
/// Chunks of one model keep their order; chunks of different models are
/// interleaved as they arrive. A closed `sink` counts as the client going
/// away and cancels every running call.
pub struct StreamMultiplexer {
    gateway: Arc<dyn ModelGateway>,
    per_call: Duration,
    global: Duration,
}

impl StreamMultiplexer {
    pub fn new(gateway: Arc<dyn ModelGateway>, per_call: Duration, global: Duration) -> Self {
        Self {
            gateway,
            per_call,
            global,
        }
    }

    pub(crate) fn from_deadlines(gateway: Arc<dyn ModelGateway>, deadlines: Deadlines) -> Self {
        Self::new(gateway, deadlines.per_call, deadlines.global)
    }

    /// Streams `request` to every id in `model_ids` and returns the final
    /// responses in `model_ids` order once `stream_end` has been emitted.
    pub async fn run(
        &self,
        session: &mut StreamSession,
        model_ids: &[String],
        request: Arc<GenerationRequest>,
        sink: mpsc::Sender<StreamEnvelope>,
        cancel: CancellationToken,
    ) -> Result<Vec<ModelResponse>, StreamStateError> {
        session.begin()?;
        let request_id = session.request_id();
        let started = Instant::now();
        let deadline = started + self.global;
        let plan = DispatchPlan::new(model_ids);
        let mut outbound = Outbound {
            sink,
            request_id,
            deadline,
            cancel: cancel.clone(),
        };

        outbound
            .send(StreamEnvelope::start(
                request_id,
                &StartPayload {
                    model_ids: model_ids.to_vec(),
                },
            ))
            .await;

        let (events_tx, mut events) = mpsc::channel(EVENT_BUFFER);
        let mut tasks = JoinSet::new();
        for (task, model_id) in plan.tasks().iter().enumerate() {
            tasks.spawn(stream_model(
                self.gateway.clone(),
                task,
                model_id.clone(),
                request.clone(),
                self.per_call,
                cancel.child_token(),
                events_tx.clone(),
            ));
        }
        drop(events_tx);

        let mut slots: Vec<Option<ModelResponse>> = vec![None; plan.tasks().len()];
        let global = sleep_until(deadline);
        tokio::pin!(global);

        let interrupted = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("stream cancelled request_id={request_id}");
                    break true;
                }
                _ = &mut global => {
                    log::warn!(
                        "stream global deadline reached request_id={request_id} deadline_ms={}",
                        self.global.as_millis()
                    );
                    break true;
                }
                event = events.recv() => match event {
                    Some(ModelEvent::Chunk { task, chunk }) => {
                        outbound
                            .send(StreamEnvelope::chunk(
                                request_id,
                                &ChunkPayload {
                                    model_id: plan.tasks()[task].clone(),
                                    chunk: chunk.text,
                                    done: chunk.done,
                                    token_count: chunk.token_count,
                                },
                            ))
                            .await;
                    }
                    Some(ModelEvent::Finished { task, response }) => {
                        if response.is_error() {
                            outbound.send(error_envelope(request_id, &response)).await;
                        }
                        slots[task] = Some(response);
                    }
                    None => break false,
                },
            }
        };

        if interrupted {
            cancel.cancel();
            tasks.abort_all();
        }
        while tasks.join_next().await.is_some() {}

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let fallback = if interrupted {
            Unfilled::Cancelled
        } else {
            Unfilled::Crashed
        };
        let mut results = Vec::with_capacity(slots.len());
        for (slot, model_id) in slots.into_iter().zip(plan.tasks()) {
            let response = match slot {
                Some(response) => response,
                None => {
                    let response = fallback.response(model_id, elapsed_ms);
                    outbound.send(error_envelope(request_id, &response)).await;
                    response
                }
            };
            results.push(response);
        }

        let responses = plan.expand(&results);
        outbound
            .send(StreamEnvelope::end(
                request_id,
                &EndPayload {
                    responses: responses.clone(),
                    total_latency_ms: elapsed_ms,
                },
            ))
            .await;
        session.close()?;
        log::debug!(
            "stream closed request_id={request_id} models={} total_latency_ms={elapsed_ms}",
            responses.len()
        );
        Ok(responses)
    }
}

/// Outbound half of the stream. The first failed send cancels the request.
///
/// A send waits for sink capacity no longer than the global deadline; once
/// the deadline has passed, envelopes that do not fit are dropped.
struct Outbound {
    sink: mpsc::Sender<StreamEnvelope>,
    request_id: uuid::Uuid,
    deadline: Instant,
    cancel: CancellationToken,
}

impl Outbound {
    async fn send(&mut self, envelope: StreamEnvelope) {
        let delivered = tokio::select! {
            biased;
            sent = self.sink.send(envelope) => {
                if sent.is_err() && !self.cancel.is_cancelled() {
                    log::info!(
                        "stream receiver dropped, cancelling request_id={}",
                        self.request_id
                    );
                }
                sent.is_ok()
            }
            _ = sleep_until(self.deadline) => {
                if !self.cancel.is_cancelled() {
                    log::warn!(
                        "stream receiver stalled past the deadline, cancelling request_id={}",
                        self.request_id
                    );
                }
                false
            }
        };
        if !delivered {
            self.cancel.cancel();
        }
    }
}

fn error_envelope(request_id: uuid::Uuid, response: &ModelResponse) -> StreamEnvelope {
    StreamEnvelope::error(
        request_id,
        &ErrorPayload {
            model_id: Some(response.model_id.clone()),
            error: response.error,
            message: response
                .error_detail
                .clone()
                .unwrap_or_else(|| "generation failed".to_string()),
        },
    )
}

async fn stream_model(
    gateway: Arc<dyn ModelGateway>,
    task: usize,
    model_id: String,
    request: Arc<GenerationRequest>,
    per_call: Duration,
    cancel: CancellationToken,
    events: mpsc::Sender<ModelEvent>,
) {
    let started = Instant::now();
    let call_token = cancel.child_token();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SlotFailure::Cancelled),
        result = timeout(
            per_call,
            pump(gateway.as_ref(), task, &model_id, &request, call_token.clone(), &events),
        ) => match result {
            Ok(collected) => collected,
            Err(_) => {
                call_token.cancel();
                Err(SlotFailure::Timeout)
            }
        }
    };

    let latency_ms = started.elapsed().as_millis() as u64;
    let response = match outcome {
        Ok(collected) => ModelResponse::success(
            model_id.as_str(),
            collected.text,
            latency_ms,
            collected.token_count,
        ),
        Err(failure) => {
            log::warn!(
                "model stream failed model_id={model_id} error={} detail={}",
                failure.tag(),
                failure.detail()
            );
            failure.into_response(&model_id, latency_ms)
        }
    };
    let _ = events.send(ModelEvent::Finished { task, response }).await;
}

async fn pump(
    gateway: &dyn ModelGateway,
    task: usize,
    model_id: &str,
    request: &GenerationRequest,
    cancel: CancellationToken,
    events: &mpsc::Sender<ModelEvent>,
) -> Result<Collected, SlotFailure> {
    let mut stream = gateway.stream(model_id, request, cancel).await?;
    let mut text = String::new();
    let mut pieces = 0u32;
    let mut reported = None;
    let mut finished = false;

    while let Some(item) = stream.next().await {
        let chunk = item?;
        text.push_str(&chunk.text);
        if !chunk.text.is_empty() {
            pieces += 1;
        }
        if chunk.token_count.is_some() {
            reported = chunk.token_count;
        }
        finished = chunk.done;
        if events.send(ModelEvent::Chunk { task, chunk }).await.is_err() {
            return Err(SlotFailure::Cancelled);
        }
        if finished {
            break;
        }
    }

    let token_count = reported.unwrap_or(pieces);
    if !finished {
        let done = TokenChunk::done(Some(token_count));
        if events.send(ModelEvent::Chunk { task, chunk: done }).await.is_err() {
            return Err(SlotFailure::Cancelled);
        }
    }
    Ok(Collected { text, token_count })
}

#[cfg(test)]
#[path = "multiplexer_tests.rs"]
mod tests;
