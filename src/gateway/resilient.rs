use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

use super::traits::ModelGateway;
use super::types::{Generation, GenerationRequest, ModelInfo, TokenStream};

/// Configuration for retry and backoff behavior.
#[derive(Clone, Debug)]
pub struct ResilienceConfig {
    /// Maximum number of attempts including the first one
    pub max_attempts: usize,
    /// Initial backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_delay_ms: u64,
    /// Whether to shave a deterministic jitter off each delay
    pub jitter: bool,
}

const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 200;
const DEFAULT_MAX_DELAY_MS: u64 = 2_000;

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

/// Gateway wrapper that retries transient adapter failures with exponential
/// backoff. Retries stop as soon as the call's cancellation token fires, so
/// the coordinator's deadlines still bound the total time spent.
pub struct ResilientGateway {
    inner: Arc<dyn ModelGateway>,
    cfg: ResilienceConfig,
}

impl ResilientGateway {
    pub fn new(inner: Arc<dyn ModelGateway>, cfg: ResilienceConfig) -> Self {
        Self { inner, cfg }
    }

    async fn retry<F, Fut, T>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let attempts = self.cfg.max_attempts.max(1);
        let mut idx = 0;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempts == 1 || !Self::is_retryable(&err) {
                return Err(err);
            }
            if idx + 1 == attempts {
                log::warn!("giving up after {attempts} attempts error={err}");
                return Err(GatewayError::RetryExceeded {
                    attempts,
                    last_error: err.to_string(),
                });
            }
            log::debug!("retrying after transient error attempt={} error={err}", idx + 1);
            tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                _ = self.backoff_sleep(idx) => {}
            }
            idx += 1;
        }
    }

    fn is_retryable(err: &GatewayError) -> bool {
        match err {
            GatewayError::HttpError(_) => true,
            GatewayError::ProviderError(_) => true,
            GatewayError::ResponseFormatError { .. } => true,
            GatewayError::JsonError(_) => true,
            GatewayError::LoadFailed { .. } => true,
            GatewayError::InvalidRequest(_) => false,
            GatewayError::UnknownModel(_) => false,
            GatewayError::Cancelled => false,
            GatewayError::RetryExceeded { .. } => false,
        }
    }

    async fn backoff_sleep(&self, attempt_index: usize) {
        let mut delay = self
            .cfg
            .base_delay_ms
            .saturating_mul(1u64 << attempt_index.min(16));
        delay = delay.min(self.cfg.max_delay_ms);
        if self.cfg.jitter {
            let span = (delay / 2).max(1);
            let jitter = ((attempt_index as u64)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1))
                % span;
            delay = delay.saturating_sub(jitter);
        }
        sleep(Duration::from_millis(delay)).await;
    }
}

#[async_trait]
impl ModelGateway for ResilientGateway {
    async fn generate(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Generation, GatewayError> {
        self.retry(&cancel, || self.inner.generate(model_id, request, cancel.clone()))
            .await
    }

    async fn stream(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GatewayError> {
        self.retry(&cancel, || self.inner.stream(model_id, request, cancel.clone()))
            .await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        self.inner.list_models().await
    }
}
