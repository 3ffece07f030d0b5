//! Scripted collaborators shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::gateway::{
    single_chunk_stream, Generation, GenerationRequest, ModelGateway, ModelInfo, TokenChunk,
    TokenStream,
};
use crate::retrieval::{RetrievalError, RetrievalQuery, RetrievedChunk, Retriever};

/// How a scripted model behaves.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Reply { text: String, delay: Duration },
    Chunks {
        pieces: Vec<String>,
        gap: Duration,
        send_done: bool,
    },
    Fail(String),
    /// Never answers; returns `Cancelled` once the token fires.
    Hang,
}

impl Script {
    pub(crate) fn reply(text: &str, delay_ms: u64) -> Self {
        Script::Reply {
            text: text.to_string(),
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub(crate) fn chunks(pieces: &[&str], gap_ms: u64, send_done: bool) -> Self {
        Script::Chunks {
            pieces: pieces.iter().map(|p| p.to_string()).collect(),
            gap: Duration::from_millis(gap_ms),
            send_done,
        }
    }
}

#[derive(Default)]
pub(crate) struct ScriptedGateway {
    scripts: HashMap<String, Script>,
    calls: Mutex<HashMap<String, usize>>,
    tokens: Mutex<Vec<CancellationToken>>,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, model_id: &str, script: Script) -> Self {
        self.scripts.insert(model_id.to_string(), script);
        self
    }

    pub(crate) fn calls(&self, model_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(model_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of calls whose cancellation token has fired.
    pub(crate) fn cancelled(&self) -> usize {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|token| token.is_cancelled())
            .count()
    }

    pub(crate) fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn script(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Script, GatewayError> {
        self.tokens.lock().unwrap().push(cancel.clone());
        *self.calls.lock().unwrap().entry(model_id.to_string()).or_default() += 1;
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.scripts
            .get(model_id)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownModel(model_id.to_string()))
    }

    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), GatewayError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn generate(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Generation, GatewayError> {
        match self.script(model_id, request, &cancel)? {
            Script::Reply { text, delay } => {
                self.wait(delay, &cancel).await?;
                Ok(Generation {
                    token_count: text.split_whitespace().count() as u32,
                    text,
                    latency_ms: None,
                })
            }
            Script::Chunks { pieces, gap, .. } => {
                self.wait(gap * pieces.len() as u32, &cancel).await?;
                Ok(Generation {
                    token_count: pieces.len() as u32,
                    text: pieces.concat(),
                    latency_ms: None,
                })
            }
            Script::Fail(message) => Err(GatewayError::ProviderError(message)),
            Script::Hang => {
                self.wait(Duration::from_secs(3_600), &cancel).await?;
                Err(GatewayError::ProviderError("hang script woke up".into()))
            }
        }
    }

    async fn stream(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GatewayError> {
        match self.script(model_id, request, &cancel)? {
            Script::Chunks {
                pieces,
                gap,
                send_done,
            } => {
                let total = pieces.len() as u32;
                let queue: VecDeque<String> = pieces.into();
                Ok(Box::pin(stream::unfold(queue, move |mut queue| async move {
                    let piece = queue.pop_front()?;
                    sleep(gap).await;
                    let last = send_done && queue.is_empty();
                    let chunk = TokenChunk {
                        text: piece,
                        done: last,
                        token_count: last.then_some(total),
                    };
                    Some((Ok(chunk), queue))
                })))
            }
            Script::Hang => Ok(Box::pin(stream::once(async move {
                cancel.cancelled().await;
                Err(GatewayError::Cancelled)
            }))),
            Script::Fail(message) => Err(GatewayError::ProviderError(message)),
            Script::Reply { text, delay } => {
                self.wait(delay, &cancel).await?;
                Ok(single_chunk_stream(Generation {
                    token_count: text.split_whitespace().count() as u32,
                    text,
                    latency_ms: None,
                }))
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        let mut ids: Vec<&String> = self.scripts.keys().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| ModelInfo {
                id: id.clone(),
                name: id.clone(),
                provider: "scripted".to_string(),
                family: None,
                parameter_size: None,
                size_bytes: None,
            })
            .collect())
    }
}

/// Retriever returning a fixed corpus, or failing every search.
pub(crate) struct StaticRetriever {
    chunks: Result<Vec<RetrievedChunk>, String>,
}

impl StaticRetriever {
    pub(crate) fn with_chunks(chunks: Vec<RetrievedChunk>) -> Self {
        Self { chunks: Ok(chunks) }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            chunks: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, _query: &RetrievalQuery) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        self.chunks.clone().map_err(RetrievalError::Backend)
    }
}

pub(crate) fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|id| id.to_string()).collect()
}
