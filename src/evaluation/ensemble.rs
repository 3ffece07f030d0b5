use serde::{Deserialize, Serialize};

use super::error::EvaluationError;
use super::types::{unit, EvaluationMode, EvaluationScore};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleComponent {
    pub mode: EvaluationMode,
    #[serde(default = "default_component_weight")]
    pub weight: f64,
}

fn default_component_weight() -> f64 {
    1.0
}

impl EnsembleComponent {
    pub fn new(mode: EvaluationMode, weight: f64) -> Self {
        Self { mode, weight }
    }
}

/// Modes combined by `ensemble`. Empty means "heuristic plus every mode the
/// engine has a collaborator for", weighted equally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default)]
    pub components: Vec<EnsembleComponent>,
}

impl EnsembleConfig {
    pub fn new(components: Vec<EnsembleComponent>) -> Self {
        Self { components }
    }

    pub fn equal(modes: &[EvaluationMode]) -> Self {
        Self::new(
            modes
                .iter()
                .map(|mode| EnsembleComponent::new(*mode, 1.0))
                .collect(),
        )
    }

    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.components.len() < 2 {
            return Err(EvaluationError::InvalidEnsemble(
                "at least two component modes are required".to_string(),
            ));
        }
        for component in &self.components {
            if matches!(
                component.mode,
                EvaluationMode::Ensemble | EvaluationMode::HumanVote
            ) {
                return Err(EvaluationError::InvalidEnsemble(format!(
                    "{} cannot be an ensemble component",
                    component.mode
                )));
            }
            if !component.weight.is_finite() || component.weight < 0.0 {
                return Err(EvaluationError::InvalidEnsemble(format!(
                    "weight for {} must be finite and non-negative",
                    component.mode
                )));
            }
        }
        if self.components.iter().map(|c| c.weight).sum::<f64>() <= 0.0 {
            return Err(EvaluationError::InvalidEnsemble(
                "component weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Weighted mean of each field across component runs. Every run must list
/// the same models in the same order.
pub(crate) fn combine(
    runs: &[(EnsembleComponent, Vec<EvaluationScore>)],
) -> Result<Vec<EvaluationScore>, EvaluationError> {
    let Some((_, first)) = runs.first() else {
        return Err(EvaluationError::InvalidEnsemble(
            "no component produced scores".to_string(),
        ));
    };
    let total: f64 = runs.iter().map(|(c, _)| c.weight).sum();

    first
        .iter()
        .enumerate()
        .map(|(idx, head)| {
            let mut merged = EvaluationScore::zeroed(&head.model_id, 0.0);
            let mut notes = Vec::with_capacity(runs.len());
            for (component, scores) in runs {
                let score = scores
                    .get(idx)
                    .filter(|s| s.model_id == head.model_id)
                    .ok_or_else(|| {
                        EvaluationError::InvalidEnsemble(format!(
                            "{} did not score {}",
                            component.mode, head.model_id
                        ))
                    })?;
                let share = component.weight / total;
                merged.relevance += share * score.relevance;
                merged.clarity += share * score.clarity;
                merged.hallucination_risk += share * score.hallucination_risk;
                merged.final_score += share * score.final_score;
                if let Some(reasoning) = &score.reasoning {
                    notes.push(format!("{}: {reasoning}", component.mode));
                }
            }
            merged.relevance = unit(merged.relevance);
            merged.clarity = unit(merged.clarity);
            merged.hallucination_risk = unit(merged.hallucination_risk);
            merged.final_score = unit(merged.final_score);
            merged.reasoning = (!notes.is_empty()).then(|| notes.join(" | "));
            Ok(merged)
        })
        .collect()
}
