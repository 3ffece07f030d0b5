use serde::{Deserialize, Serialize};

use crate::error::LentraError;

use super::params::GenerationParams;

/// Longest prompt accepted, in characters.
pub const MAX_PROMPT_CHARS: usize = 32_768;

const DEFAULT_RAG_TOP_K: usize = 5;
const MAX_RAG_TOP_K: usize = 20;
const DEFAULT_RAG_THRESHOLD: f64 = 0.3;

/// A named system prompt applied to every model in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub system_prompt: String,
}

/// Retrieval knobs for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagParams {
    pub top_k: usize,
    pub score_threshold: f64,
    pub collection: Option<String>,
}

impl Default for RagParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_RAG_TOP_K,
            score_threshold: DEFAULT_RAG_THRESHOLD,
            collection: None,
        }
    }
}

/// One prompt addressed to an ordered list of models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    pub model_ids: Vec<String>,
    #[serde(default)]
    pub persona: Option<Persona>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Template using `{context}` and `{question}` placeholders.
    #[serde(default)]
    pub instruction_prompt: Option<String>,
    /// Context supplied directly; skips retrieval when present.
    #[serde(default)]
    pub context_text: Option<String>,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default)]
    pub use_rag: bool,
    /// Overrides the coordinator's retrieval defaults.
    #[serde(default)]
    pub rag: Option<RagParams>,
    #[serde(default)]
    pub stream: bool,
}

impl PromptRequest {
    pub fn new<I, S>(prompt: impl Into<String>, model_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            model_ids: model_ids.into_iter().map(Into::into).collect(),
            persona: None,
            system_prompt: None,
            instruction_prompt: None,
            context_text: None,
            params: GenerationParams::default(),
            use_rag: false,
            rag: None,
            stream: false,
        }
    }

    pub fn persona(mut self, name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        self.persona = Some(Persona {
            name: name.into(),
            system_prompt: system_prompt.into(),
        });
        self
    }

    pub fn system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn instruction_prompt(mut self, template: impl Into<String>) -> Self {
        self.instruction_prompt = Some(template.into());
        self
    }

    pub fn context_text(mut self, context: impl Into<String>) -> Self {
        self.context_text = Some(context.into());
        self
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn use_rag(mut self, enabled: bool) -> Self {
        self.use_rag = enabled;
        self
    }

    pub fn rag(mut self, rag: RagParams) -> Self {
        self.rag = Some(rag);
        self
    }

    pub fn stream(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    /// Checks everything that must hold before any backend is contacted.
    pub fn validate(&self) -> Result<(), LentraError> {
        if self.prompt.trim().is_empty() {
            return Err(LentraError::validation("prompt must not be empty"));
        }
        let prompt_chars = self.prompt.chars().count();
        if prompt_chars > MAX_PROMPT_CHARS {
            return Err(LentraError::validation(format!(
                "prompt is {prompt_chars} characters, limit is {MAX_PROMPT_CHARS}"
            )));
        }
        if self.model_ids.is_empty() {
            return Err(LentraError::validation("at least one model id is required"));
        }
        if self.model_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(LentraError::validation("model ids must not be blank"));
        }
        self.params.validate()?;
        if let Some(rag) = &self.rag {
            validate_rag(rag)?;
        }
        Ok(())
    }
}

fn validate_rag(rag: &RagParams) -> Result<(), LentraError> {
    if !(1..=MAX_RAG_TOP_K).contains(&rag.top_k) {
        return Err(LentraError::validation(format!(
            "rag top_k must be within 1..={MAX_RAG_TOP_K}, got {}",
            rag.top_k
        )));
    }
    if !(0.0..=1.0).contains(&rag.score_threshold) {
        return Err(LentraError::validation(format!(
            "rag score_threshold must be within 0..=1, got {}",
            rag.score_threshold
        )));
    }
    Ok(())
}
