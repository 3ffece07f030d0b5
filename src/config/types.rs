use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "ollama")]
use crate::backends::ollama::OllamaConfig;
use crate::coordinator::CoordinatorConfig;
use crate::evaluation::{EnsembleConfig, EvaluationMode, ScoreWeights, DEFAULT_BALLOT_TTL_HOURS};
use crate::gateway::ResilienceConfig;
use crate::history::{HistoryCapacity, DEFAULT_HISTORY_CAPACITY};

use super::error::ConfigError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];
const DEFAULT_JUDGE_MODEL: &str = "llama3.1:8b";
const DEFAULT_JUDGE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub coordinator: CoordinatorSection,
    pub evaluation: EvaluationSection,
    pub history: HistorySection,
    #[cfg(feature = "ollama")]
    pub ollama: OllamaConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator.validate()?;
        self.evaluation.validate()?;
        self.history.capacity()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorSection {
    pub per_call_timeout_secs: u64,
    pub global_slack_secs: u64,
    pub rag_top_k: usize,
    pub rag_score_threshold: f64,
    pub rag_collection: Option<String>,
    pub rag_required: bool,
    /// Attempts per model call; 1 disables retries.
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        let runtime = CoordinatorConfig::default();
        let retry = ResilienceConfig::default();
        Self {
            per_call_timeout_secs: runtime.per_call_timeout.as_secs(),
            global_slack_secs: runtime.global_slack.as_secs(),
            rag_top_k: runtime.rag_top_k,
            rag_score_threshold: runtime.rag_score_threshold,
            rag_collection: runtime.rag_collection,
            rag_required: runtime.rag_required,
            retry_attempts: 1,
            retry_base_delay_ms: retry.base_delay_ms,
            retry_max_delay_ms: retry.max_delay_ms,
        }
    }
}

impl CoordinatorSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.per_call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.per_call_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !(1..=20).contains(&self.rag_top_k) {
            return Err(ConfigError::Invalid(format!(
                "coordinator.rag_top_k must be within 1..=20, got {}",
                self.rag_top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.rag_score_threshold) {
            return Err(ConfigError::Invalid(format!(
                "coordinator.rag_score_threshold must be within 0..=1, got {}",
                self.rag_score_threshold
            )));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_runtime(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            per_call_timeout: Duration::from_secs(self.per_call_timeout_secs),
            global_slack: Duration::from_secs(self.global_slack_secs),
            rag_top_k: self.rag_top_k,
            rag_score_threshold: self.rag_score_threshold,
            rag_collection: self.rag_collection.clone(),
            rag_required: self.rag_required,
        }
    }

    /// Retry policy for the gateway, if retries are enabled.
    pub fn resilience(&self) -> Option<ResilienceConfig> {
        (self.retry_attempts > 1).then(|| ResilienceConfig {
            max_attempts: self.retry_attempts,
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
            ..ResilienceConfig::default()
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluationSection {
    /// Mode used when a request names none.
    pub default_mode: EvaluationMode,
    pub weights: ScoreWeights,
    /// Served through the same gateway as the compared models.
    pub judge_model: Option<String>,
    pub judge_timeout_secs: u64,
    /// Enables `embedding_similarity` when set.
    pub embedding_model: Option<String>,
    pub ensemble: EnsembleConfig,
    pub ballot_ttl_hours: i64,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            default_mode: EvaluationMode::default(),
            weights: ScoreWeights::default(),
            judge_model: Some(DEFAULT_JUDGE_MODEL.to_string()),
            judge_timeout_secs: DEFAULT_JUDGE_TIMEOUT_SECS,
            embedding_model: None,
            ensemble: EnsembleConfig::default(),
            ballot_ttl_hours: DEFAULT_BALLOT_TTL_HOURS,
        }
    }
}

impl EvaluationSection {
    fn validate(&self) -> Result<(), ConfigError> {
        self.weights
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("evaluation.weights: {err}")))?;
        if !self.ensemble.components.is_empty() {
            self.ensemble
                .validate()
                .map_err(|err| ConfigError::Invalid(format!("evaluation.ensemble: {err}")))?;
        }
        if self.ballot_ttl_hours <= 0 {
            return Err(ConfigError::Invalid(
                "evaluation.ballot_ttl_hours must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs)
    }

    pub fn ballot_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ballot_ttl_hours)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistorySection {
    pub capacity: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl HistorySection {
    pub fn capacity(&self) -> Result<HistoryCapacity, ConfigError> {
        HistoryCapacity::try_from(self.capacity)
            .map_err(|err| ConfigError::Invalid(format!("history.capacity: {err}")))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
