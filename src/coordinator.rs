//! Validation, fan-out and order-stable fan-in for one prompt request.

#[path = "coordinator/config.rs"]
mod config;

#[path = "coordinator/compose.rs"]
mod compose;

#[path = "coordinator/plan.rs"]
pub(crate) mod plan;

#[path = "coordinator/fan_out.rs"]
pub(crate) mod fan_out;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::LentraError;
use crate::gateway::ModelGateway;
use crate::prompt::{ModelResponse, PromptRequest};
use crate::retrieval::{RetrievalAssembler, RetrievalError, RetrievalQuery, RetrievedChunk};
use crate::stream::{StreamEnvelope, StreamMultiplexer, StreamSession};

pub use config::CoordinatorConfig;

use compose::compose;
use fan_out::{fan_out, Deadlines};
use plan::DispatchPlan;

/// Where the context given to the models came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// `context_text` on the request.
    Direct,
    Retrieval,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub chunks: Vec<RetrievedChunk>,
    pub source: ContextSource,
}

/// Everything one dispatch produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub request_id: Uuid,
    /// One entry per requested model id, in request order.
    pub responses: Vec<ModelResponse>,
    pub context: Option<AssembledContext>,
    /// Retrieval was requested, failed, and the models ran without context.
    pub rag_degraded: bool,
    pub total_latency_ms: u64,
}

/// Sends a validated [`PromptRequest`] to every requested model concurrently.
///
/// Each model runs in its own task under the per-call deadline; the whole
/// fan-out runs under the global deadline. Slow or failing models never
/// hold back or disturb their siblings, and the response list always has
/// one entry per requested id in request order.
pub struct RequestCoordinator {
    gateway: Arc<dyn ModelGateway>,
    retrieval: Option<RetrievalAssembler>,
    config: CoordinatorConfig,
}

impl RequestCoordinator {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: CoordinatorConfig) -> Self {
        Self {
            gateway,
            retrieval: None,
            config,
        }
    }

    pub fn with_retrieval(mut self, assembler: RetrievalAssembler) -> Self {
        self.retrieval = Some(assembler);
        self
    }

    pub fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub async fn dispatch(&self, request: &PromptRequest) -> Result<DispatchOutcome, LentraError> {
        self.dispatch_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Like [`Self::dispatch`], but `cancel` aborts every in-flight call.
    /// Slots that had not finished come back tagged `cancelled`.
    pub async fn dispatch_with_cancel(
        &self,
        request: &PromptRequest,
        cancel: CancellationToken,
    ) -> Result<DispatchOutcome, LentraError> {
        request.validate()?;
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let (context, rag_degraded) = self.resolve_context(request).await?;

        let generation = Arc::new(compose(
            request,
            context.as_ref().map(|ctx| ctx.text.as_str()),
        ));
        let plan = DispatchPlan::new(&request.model_ids);
        log::info!(
            "dispatching request_id={request_id} models={} distinct={} context={}",
            request.model_ids.len(),
            plan.tasks().len(),
            context.is_some()
        );

        let results = fan_out(
            self.gateway.clone(),
            plan.tasks(),
            generation,
            self.deadlines(),
            cancel.child_token(),
        )
        .await;
        let responses = plan.expand(&results);

        let total_latency_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "request finished request_id={request_id} failed={} total_latency_ms={total_latency_ms}",
            responses.iter().filter(|r| r.is_error()).count()
        );
        Ok(DispatchOutcome {
            request_id,
            responses,
            context,
            rag_degraded,
            total_latency_ms,
        })
    }

    /// Streams the request through a [`StreamMultiplexer`], writing envelopes
    /// for `session` to `sink`. Dropping the receiving end of `sink` cancels
    /// the request.
    pub async fn dispatch_streaming(
        &self,
        request: &PromptRequest,
        session: &mut StreamSession,
        sink: mpsc::Sender<StreamEnvelope>,
        cancel: CancellationToken,
    ) -> Result<DispatchOutcome, LentraError> {
        request.validate()?;
        let started = Instant::now();
        let (context, rag_degraded) = self.resolve_context(request).await?;
        let generation = Arc::new(compose(
            request,
            context.as_ref().map(|ctx| ctx.text.as_str()),
        ));

        let multiplexer = StreamMultiplexer::from_deadlines(self.gateway.clone(), self.deadlines());
        let responses = multiplexer
            .run(
                session,
                &request.model_ids,
                generation,
                sink,
                cancel.child_token(),
            )
            .await?;

        Ok(DispatchOutcome {
            request_id: session.request_id(),
            responses,
            context,
            rag_degraded,
            total_latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn deadlines(&self) -> Deadlines {
        Deadlines {
            per_call: self.config.per_call_timeout,
            global: self.config.global_deadline(),
        }
    }

    fn retrieval_query(&self, request: &PromptRequest) -> RetrievalQuery {
        match &request.rag {
            Some(rag) => RetrievalQuery {
                query: request.prompt.clone(),
                top_k: rag.top_k,
                score_threshold: rag.score_threshold,
                collection: rag
                    .collection
                    .clone()
                    .or_else(|| self.config.rag_collection.clone()),
            },
            None => RetrievalQuery {
                query: request.prompt.clone(),
                top_k: self.config.rag_top_k,
                score_threshold: self.config.rag_score_threshold,
                collection: self.config.rag_collection.clone(),
            },
        }
    }

    /// Direct context wins over retrieval. A retrieval failure degrades to no
    /// context unless the coordinator is configured to require it.
    async fn resolve_context(
        &self,
        request: &PromptRequest,
    ) -> Result<(Option<AssembledContext>, bool), LentraError> {
        if let Some(text) = request
            .context_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
        {
            let context = AssembledContext {
                text: text.to_string(),
                chunks: Vec::new(),
                source: ContextSource::Direct,
            };
            return Ok((Some(context), false));
        }
        if !request.use_rag {
            return Ok((None, false));
        }

        let query = self.retrieval_query(request);
        let retrieved = match &self.retrieval {
            Some(assembler) => assembler.retrieve(&query).await,
            None => Err(RetrievalError::NotConfigured),
        };

        match retrieved {
            Ok(retrieval) if retrieval.context.is_empty() => {
                log::debug!("retrieval returned no usable chunks");
                Ok((None, false))
            }
            Ok(retrieval) => Ok((
                Some(AssembledContext {
                    text: retrieval.context,
                    chunks: retrieval.chunks,
                    source: ContextSource::Retrieval,
                }),
                false,
            )),
            Err(err) if self.config.rag_required => {
                log::error!("retrieval failed and is required error={err}");
                Err(err.into())
            }
            Err(err) => {
                log::warn!("retrieval failed, continuing without context error={err}");
                Ok((None, true))
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator/coordinator_tests.rs"]
mod tests;
