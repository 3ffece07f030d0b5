//! Ollama client implementation: one [`ModelAdapter`] per pulled model.
//!
//! Generation goes through `/api/generate` (plain JSON or NDJSON streaming),
//! warm-up through `/api/show`, the catalog through `/api/tags` and
//! embeddings through `/api/embed`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::evaluation::{Embedder, EvaluationError};
use crate::gateway::{
    AdapterFactory, Generation, GenerationRequest, ModelAdapter, ModelInfo, TokenChunk,
    TokenStream,
};

use super::ndjson::create_ndjson_stream;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const PROVIDER: &str = "ollama";

/// Connection settings shared by every Ollama adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Upper bound on one HTTP exchange; the coordinator's deadline is usually tighter.
    pub timeout_secs: u64,
    /// Forwarded as `keep_alive`, e.g. "5m".
    pub keep_alive: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            keep_alive: None,
        }
    }
}

impl OllamaConfig {
    pub fn build_client(&self) -> Result<Client, GatewayError> {
        Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(GatewayError::from)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Adapter serving one Ollama model.
///
/// Cloning is cheap: the config sits behind an `Arc` and `Client` is
/// reference counted.
#[derive(Debug, Clone)]
pub struct Ollama {
    model_id: String,
    config: Arc<OllamaConfig>,
    client: Client,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a str>,
}

#[derive(Serialize)]
struct GenerateOptions<'a> {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
    #[serde(skip_serializing_if = "no_stop")]
    stop: &'a [String],
}

fn no_stop(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Deserialize, Debug)]
struct GenerateReply {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    eval_count: Option<u32>,
    /// Nanoseconds.
    total_duration: Option<u64>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: String,
}

#[derive(Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
    size: Option<u64>,
    #[serde(default)]
    details: TagDetails,
}

#[derive(Deserialize, Default)]
struct TagDetails {
    family: Option<String>,
    parameter_size: Option<String>,
}

#[derive(Serialize)]
struct ShowBody<'a> {
    model: &'a str,
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedReply {
    embeddings: Vec<Vec<f32>>,
}

impl Ollama {
    pub fn new(model_id: impl Into<String>, config: OllamaConfig) -> Result<Self, GatewayError> {
        let client = config.build_client()?;
        Ok(Self::with_client(client, model_id, Arc::new(config)))
    }

    pub fn with_client(
        client: Client,
        model_id: impl Into<String>,
        config: Arc<OllamaConfig>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            config,
            client,
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest, stream: bool) -> GenerateBody<'a> {
        let params = &request.params;
        GenerateBody {
            model: &self.model_id,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                top_p: params.top_p,
                top_k: params.top_k,
                repeat_penalty: params.repeat_penalty,
                presence_penalty: params.presence_penalty,
                frequency_penalty: params.frequency_penalty,
                stop: &params.stop,
            },
            keep_alive: self.config.keep_alive.as_deref(),
        }
    }

    async fn post_generate(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let body = self.body(request, stream);
        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(&body) {
                log::trace!("ollama request model_id={} payload={json}", self.model_id);
            }
        }

        let resp = self
            .client
            .post(self.config.url("/api/generate"))
            .json(&body)
            .send()
            .await?;
        log::debug!(
            "ollama HTTP status model_id={} status={}",
            self.model_id,
            resp.status()
        );
        check_status(resp, &self.model_id).await
    }

    async fn generate_once(&self, request: &GenerationRequest) -> Result<Generation, GatewayError> {
        let resp = self.post_generate(request, false).await?;
        let raw = resp.text().await?;
        let reply: GenerateReply =
            serde_json::from_str(&raw).map_err(|err| GatewayError::ResponseFormatError {
                message: format!("Failed to decode Ollama reply: {err}"),
                raw_response: raw.clone(),
            })?;
        if let Some(error) = reply.error {
            return Err(GatewayError::ProviderError(error));
        }
        Ok(Generation {
            token_count: reply
                .eval_count
                .unwrap_or_else(|| reply.response.split_whitespace().count() as u32),
            text: reply.response,
            latency_ms: reply.total_duration.map(|ns| ns / 1_000_000),
        })
    }
}

#[async_trait]
impl ModelAdapter for Ollama {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Generation, GatewayError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            result = self.generate_once(request) => result,
        }
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GatewayError> {
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            resp = self.post_generate(request, true) => resp?,
        };

        let lines = create_ndjson_stream(resp, parse_stream_line)
            .take_until(cancel.clone().cancelled_owned());
        let tail = stream::once(async move {
            cancel
                .is_cancelled()
                .then_some(Err(GatewayError::Cancelled))
        })
        .filter_map(futures::future::ready);
        Ok(Box::pin(lines.chain(tail)))
    }

    async fn health_check(&self) -> Result<(), GatewayError> {
        let resp = self
            .client
            .get(self.config.url("/api/version"))
            .send()
            .await?;
        check_status(resp, &self.model_id).await.map(|_| ())
    }
}

/// One NDJSON line of a streamed `/api/generate` reply.
pub(crate) fn parse_stream_line(line: &str) -> Result<Option<TokenChunk>, GatewayError> {
    let reply: GenerateReply = serde_json::from_str(line)?;
    if let Some(error) = reply.error {
        return Err(GatewayError::ProviderError(error));
    }
    if reply.done {
        return Ok(Some(TokenChunk {
            text: reply.response,
            done: true,
            token_count: reply.eval_count,
        }));
    }
    if reply.response.is_empty() {
        return Ok(None);
    }
    Ok(Some(TokenChunk::text(reply.response)))
}

async fn check_status(
    resp: reqwest::Response,
    model_id: &str,
) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let raw = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorReply>(&raw)
        .map(|e| e.error)
        .unwrap_or(raw);
    if status == StatusCode::NOT_FOUND {
        return Err(GatewayError::UnknownModel(format!("{model_id} ({message})")));
    }
    Err(GatewayError::ProviderError(format!("{status}: {message}")))
}

/// Loads Ollama adapters for [`crate::gateway::AdapterPool`].
#[derive(Debug, Clone)]
pub struct OllamaFactory {
    config: Arc<OllamaConfig>,
    client: Client,
}

impl OllamaFactory {
    pub fn new(config: OllamaConfig) -> Result<Self, GatewayError> {
        let client = config.build_client()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: OllamaConfig) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }
}

#[async_trait]
impl AdapterFactory for OllamaFactory {
    /// Confirms the model exists through `/api/show` before handing out an adapter.
    async fn load(&self, model_id: &str) -> Result<Arc<dyn ModelAdapter>, GatewayError> {
        let resp = self
            .client
            .post(self.config.url("/api/show"))
            .json(&ShowBody { model: model_id })
            .send()
            .await
            .map_err(|err| GatewayError::LoadFailed {
                model_id: model_id.to_string(),
                reason: err.to_string(),
            })?;
        match check_status(resp, model_id).await {
            Ok(_) => {}
            Err(GatewayError::UnknownModel(detail)) => {
                return Err(GatewayError::UnknownModel(detail))
            }
            Err(err) => {
                return Err(GatewayError::LoadFailed {
                    model_id: model_id.to_string(),
                    reason: err.to_string(),
                })
            }
        }
        log::info!("ollama model ready model_id={model_id}");
        Ok(Arc::new(Ollama::with_client(
            self.client.clone(),
            model_id,
            self.config.clone(),
        )))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        let resp = self
            .client
            .get(self.config.url("/api/tags"))
            .send()
            .await?
            .error_for_status()?;
        let tags: TagsReply = resp.json().await?;
        Ok(tags
            .models
            .into_iter()
            .map(|entry| ModelInfo {
                id: entry.name.clone(),
                name: entry.name,
                provider: PROVIDER.to_string(),
                family: entry.details.family,
                parameter_size: entry.details.parameter_size,
                size_bytes: entry.size,
            })
            .collect())
    }
}

/// Embeddings from an Ollama embedding model, for `embedding_similarity` scoring.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    model: String,
    config: Arc<OllamaConfig>,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(model: impl Into<String>, config: OllamaConfig) -> Result<Self, GatewayError> {
        let client = config.build_client()?;
        Ok(Self::with_client(client, model, config))
    }

    pub fn with_client(client: Client, model: impl Into<String>, config: OllamaConfig) -> Self {
        Self {
            model: model.into(),
            config: Arc::new(config),
            client,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EvaluationError> {
        let embedding_error = |err: GatewayError| EvaluationError::Embedding(err.to_string());
        let resp = self
            .client
            .post(self.config.url("/api/embed"))
            .json(&EmbedBody {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|err| embedding_error(err.into()))?;
        let resp = check_status(resp, &self.model)
            .await
            .map_err(embedding_error)?;
        let reply: EmbedReply = resp
            .json()
            .await
            .map_err(|err| embedding_error(err.into()))?;
        if reply.embeddings.len() != texts.len() {
            return Err(EvaluationError::Embedding(format!(
                "expected {} embeddings from {}, got {}",
                texts.len(),
                self.model,
                reply.embeddings.len()
            )));
        }
        Ok(reply.embeddings)
    }
}

#[cfg(test)]
#[path = "ollama_tests.rs"]
mod tests;
