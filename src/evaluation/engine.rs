use std::sync::Arc;

use super::embedding::{self, Embedder};
use super::ensemble::{self, EnsembleComponent, EnsembleConfig};
use super::error::EvaluationError;
use super::heuristic;
use super::judge::{self, JudgeSettings};
use super::ranking::rank;
use super::types::{
    candidates, Candidate, EvaluationMode, EvaluationRequest, EvaluationResult, EvaluationScore,
    ScoreWeights,
};

/// Scores and ranks responses. Holds no per-request state, so one engine
/// can serve concurrent evaluations.
#[derive(Clone, Default)]
pub struct EvaluationEngine {
    weights: ScoreWeights,
    embedder: Option<Arc<dyn Embedder>>,
    judge: Option<JudgeSettings>,
    ensemble: EnsembleConfig,
}

struct Inputs<'a> {
    prompt: &'a str,
    reference: Option<&'a str>,
    context: Option<&'a str>,
    candidates: &'a [Candidate<'a>],
    weights: &'a ScoreWeights,
    judge_model: Option<&'a str>,
}

impl EvaluationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_judge(mut self, judge: JudgeSettings) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_ensemble(mut self, ensemble: EnsembleConfig) -> Self {
        self.ensemble = ensemble;
        self
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Scores every non-error response under `request.mode` and ranks them.
    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResult, EvaluationError> {
        let weights = request.weights.unwrap_or(self.weights);
        weights.validate()?;

        let candidates = candidates(&request.responses);
        if candidates.is_empty() {
            log::warn!(
                "nothing to evaluate mode={} responses={}",
                request.mode,
                request.responses.len()
            );
            return Err(EvaluationError::NoResponses);
        }

        if request.mode == EvaluationMode::HumanVote {
            return Ok(awaiting_vote(&candidates));
        }

        let inputs = Inputs {
            prompt: &request.prompt,
            reference: request.reference_text.as_deref(),
            context: request.context.as_deref(),
            candidates: &candidates,
            weights: &weights,
            judge_model: request.judge_model.as_deref(),
        };
        let scores = match request.mode {
            EvaluationMode::Ensemble => {
                let config = match &request.ensemble {
                    Some(config) => config.clone(),
                    None => self.ensemble_config(),
                };
                self.run_ensemble(&config, &inputs).await?
            }
            mode => self.run_mode(mode, &inputs).await?,
        };

        let latencies: Vec<u64> = candidates.iter().map(|c| c.latency_ms).collect();
        let ranking = rank(&scores, &latencies);
        log::debug!(
            "evaluation finished mode={} scored={} winner={:?} tie={}",
            request.mode,
            scores.len(),
            ranking.winner,
            ranking.is_tie
        );
        Ok(EvaluationResult {
            mode: request.mode,
            scores,
            winner: ranking.winner,
            is_tie: ranking.is_tie,
            ranking: ranking.order,
            awaiting_vote: false,
            reasoning: None,
        })
    }

    async fn run_mode(
        &self,
        mode: EvaluationMode,
        inputs: &Inputs<'_>,
    ) -> Result<Vec<EvaluationScore>, EvaluationError> {
        match mode {
            EvaluationMode::Heuristic => Ok(inputs
                .candidates
                .iter()
                .map(|c| heuristic::score(inputs.prompt, c, inputs.weights))
                .collect()),
            EvaluationMode::EmbeddingSimilarity => {
                let embedder = self
                    .embedder
                    .as_deref()
                    .ok_or(EvaluationError::MissingEmbedder)?;
                let anchor = inputs.reference.unwrap_or(inputs.prompt);
                embedding::score(embedder, anchor, inputs.candidates, inputs.weights).await
            }
            EvaluationMode::LlmJudge => {
                let configured = self.judge.as_ref().ok_or(EvaluationError::MissingJudge)?;
                let settings = match inputs.judge_model {
                    Some(model_id) if model_id != configured.model_id => JudgeSettings {
                        model_id: model_id.to_string(),
                        ..configured.clone()
                    },
                    _ => configured.clone(),
                };
                Ok(judge::score(
                    &settings,
                    inputs.prompt,
                    inputs.context,
                    inputs.candidates,
                    inputs.weights,
                )
                .await)
            }
            EvaluationMode::Ensemble | EvaluationMode::HumanVote => {
                Err(EvaluationError::InvalidEnsemble(format!(
                    "{mode} cannot be scored directly"
                )))
            }
        }
    }

    async fn run_ensemble(
        &self,
        config: &EnsembleConfig,
        inputs: &Inputs<'_>,
    ) -> Result<Vec<EvaluationScore>, EvaluationError> {
        config.validate()?;
        let mut runs: Vec<(EnsembleComponent, Vec<EvaluationScore>)> =
            Vec::with_capacity(config.components.len());
        for component in &config.components {
            let scores = self.run_mode(component.mode, inputs).await?;
            runs.push((*component, scores));
        }
        ensemble::combine(&runs)
    }

    /// The configured ensemble, or heuristic plus every available collaborator.
    fn ensemble_config(&self) -> EnsembleConfig {
        if !self.ensemble.components.is_empty() {
            return self.ensemble.clone();
        }
        let mut modes = vec![EvaluationMode::Heuristic];
        if self.embedder.is_some() {
            modes.push(EvaluationMode::EmbeddingSimilarity);
        }
        if self.judge.is_some() {
            modes.push(EvaluationMode::LlmJudge);
        }
        EnsembleConfig::equal(&modes)
    }
}

fn awaiting_vote(candidates: &[Candidate<'_>]) -> EvaluationResult {
    EvaluationResult {
        mode: EvaluationMode::HumanVote,
        scores: candidates
            .iter()
            .map(|c| EvaluationScore::zeroed(c.model_id, 0.0))
            .collect(),
        winner: None,
        is_tie: false,
        ranking: Vec::new(),
        awaiting_vote: true,
        reasoning: Some("Awaiting human vote; open a ballot to collect it.".to_string()),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
