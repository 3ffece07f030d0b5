use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::prompt::ModelResponse;

use super::ensemble::EnsembleConfig;
use super::error::EvaluationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    Heuristic,
    EmbeddingSimilarity,
    LlmJudge,
    Ensemble,
    HumanVote,
}

impl EvaluationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationMode::Heuristic => "heuristic",
            EvaluationMode::EmbeddingSimilarity => "embedding_similarity",
            EvaluationMode::LlmJudge => "llm_judge",
            EvaluationMode::Ensemble => "ensemble",
            EvaluationMode::HumanVote => "human_vote",
        }
    }
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(EvaluationMode::Heuristic),
            "embedding_similarity" | "embedding" => Ok(EvaluationMode::EmbeddingSimilarity),
            "llm_judge" | "judge" => Ok(EvaluationMode::LlmJudge),
            "ensemble" => Ok(EvaluationMode::Ensemble),
            "human_vote" => Ok(EvaluationMode::HumanVote),
            other => Err(format!("unknown evaluation mode: {other}")),
        }
    }
}

/// Relative weight of each component in the final score.
///
/// The final score is divided by the weight sum, so any valid weights keep
/// it within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub relevance: f64,
    pub clarity: f64,
    pub hallucination: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            relevance: 0.4,
            clarity: 0.3,
            hallucination: 0.3,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<(), EvaluationError> {
        let all = [self.relevance, self.clarity, self.hallucination];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EvaluationError::InvalidWeights(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(EvaluationError::InvalidWeights(
                "weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `(w_r*relevance + w_c*clarity + w_h*(1 - risk)) / (w_r + w_c + w_h)`
    pub fn final_score(&self, relevance: f64, clarity: f64, hallucination_risk: f64) -> f64 {
        let sum = self.relevance + self.clarity + self.hallucination;
        if sum <= 0.0 {
            return 0.0;
        }
        let weighted = self.relevance * relevance
            + self.clarity * clarity
            + self.hallucination * (1.0 - hallucination_risk);
        (weighted / sum).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub model_id: String,
    pub relevance: f64,
    pub clarity: f64,
    pub hallucination_risk: f64,
    pub final_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl EvaluationScore {
    /// Builds a score from raw components, clamping each into `[0, 1]`.
    pub(crate) fn from_components(
        model_id: &str,
        relevance: f64,
        clarity: f64,
        hallucination_risk: f64,
        weights: &ScoreWeights,
        reasoning: Option<String>,
    ) -> Self {
        let relevance = unit(relevance);
        let clarity = unit(clarity);
        let hallucination_risk = unit(hallucination_risk);
        Self {
            model_id: model_id.to_string(),
            relevance,
            clarity,
            hallucination_risk,
            final_score: weights.final_score(relevance, clarity, hallucination_risk),
            reasoning,
        }
    }

    pub(crate) fn zeroed(model_id: &str, final_score: f64) -> Self {
        Self {
            model_id: model_id.to_string(),
            relevance: 0.0,
            clarity: 0.0,
            hallucination_risk: 0.0,
            final_score,
            reasoning: None,
        }
    }
}

/// Clamps into `[0, 1]`, mapping NaN to 0.
pub(crate) fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub mode: EvaluationMode,
    /// Scores in candidate order, one per scored model id.
    pub scores: Vec<EvaluationScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub is_tie: bool,
    /// Model ids, best first.
    pub ranking: Vec<String>,
    /// Set for `human_vote` until a ballot is decided.
    #[serde(default)]
    pub awaiting_vote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Inputs to [`super::EvaluationEngine::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub prompt: String,
    pub responses: Vec<ModelResponse>,
    pub mode: EvaluationMode,
    /// Compared against instead of the prompt in embedding mode.
    pub reference_text: Option<String>,
    /// Context the models were given, shown to the judge.
    pub context: Option<String>,
    pub weights: Option<ScoreWeights>,
    pub ensemble: Option<EnsembleConfig>,
    /// Judge model for this request; the engine's configured judge otherwise.
    pub judge_model: Option<String>,
}

impl EvaluationRequest {
    pub fn new(
        prompt: impl Into<String>,
        responses: Vec<ModelResponse>,
        mode: EvaluationMode,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            responses,
            mode,
            reference_text: None,
            context: None,
            weights: None,
            ensemble: None,
            judge_model: None,
        }
    }

    pub fn reference_text(mut self, reference: impl Into<String>) -> Self {
        self.reference_text = Some(reference.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn ensemble(mut self, ensemble: EnsembleConfig) -> Self {
        self.ensemble = Some(ensemble);
        self
    }

    pub fn judge_model(mut self, model_id: impl Into<String>) -> Self {
        self.judge_model = Some(model_id.into());
        self
    }
}

/// A response that can be scored: no error tag, first occurrence of its id.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub(crate) model_id: &'a str,
    pub(crate) text: &'a str,
    pub(crate) latency_ms: u64,
}

pub(crate) fn candidates(responses: &[ModelResponse]) -> Vec<Candidate<'_>> {
    let mut out: Vec<Candidate<'_>> = Vec::with_capacity(responses.len());
    for response in responses.iter().filter(|r| !r.is_error()) {
        if out.iter().any(|c| c.model_id == response.model_id) {
            continue;
        }
        out.push(Candidate {
            model_id: &response.model_id,
            text: &response.text,
            latency_ms: response.latency_ms,
        });
    }
    out
}
