use serde::{Deserialize, Serialize};

use crate::error::LentraError;

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TOP_P: f32 = 0.9;
const DEFAULT_TOP_K: u32 = 40;
const DEFAULT_REPEAT_PENALTY: f32 = 1.1;

/// Caller-supplied sampling parameters. Every field is optional and falls back
/// to a default when the request is resolved for an adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
}

/// Parameters with every default filled in, as handed to adapters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub stop: Vec<String>,
}

impl Default for ResolvedParams {
    fn default() -> Self {
        GenerationParams::default().resolve()
    }
}

impl GenerationParams {
    /// Fills unset fields with defaults.
    pub fn resolve(&self) -> ResolvedParams {
        ResolvedParams {
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            top_p: self.top_p.unwrap_or(DEFAULT_TOP_P),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            repeat_penalty: self.repeat_penalty.unwrap_or(DEFAULT_REPEAT_PENALTY),
            presence_penalty: self.presence_penalty.unwrap_or(0.0),
            frequency_penalty: self.frequency_penalty.unwrap_or(0.0),
            stop: self.stop.clone().unwrap_or_default(),
        }
    }

    /// Rejects values outside the ranges backends accept.
    pub fn validate(&self) -> Result<(), LentraError> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("repeat_penalty", self.repeat_penalty, 1.0, 2.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        if let Some(max_tokens) = self.max_tokens {
            if !(1..=32_768).contains(&max_tokens) {
                return Err(LentraError::validation(format!(
                    "max_tokens must be within 1..=32768, got {max_tokens}"
                )));
            }
        }
        if let Some(top_k) = self.top_k {
            if !(1..=100).contains(&top_k) {
                return Err(LentraError::validation(format!(
                    "top_k must be within 1..=100, got {top_k}"
                )));
            }
        }
        Ok(())
    }
}

fn check_range(name: &str, value: Option<f32>, min: f32, max: f32) -> Result<(), LentraError> {
    let Some(value) = value else {
        return Ok(());
    };
    if value.is_finite() && value >= min && value <= max {
        return Ok(());
    }
    Err(LentraError::validation(format!(
        "{name} must be within {min}..={max}, got {value}"
    )))
}
