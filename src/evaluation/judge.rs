use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::gateway::{GenerationRequest, ModelGateway};
use crate::prompt::ResolvedParams;

use super::error::EvaluationError;
use super::heuristic::{self, Components};
use super::types::{Candidate, EvaluationScore, ScoreWeights};

pub const DEFAULT_JUDGE_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_JUDGE_MAX_TOKENS: u32 = 1024;
const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_CONTEXT_CHARS: usize = 2_000;
const MAX_RESPONSE_CHARS: usize = 3_000;
const REPLY_PREVIEW_CHARS: usize = 200;

const JUDGE_SYSTEM_PROMPT: &str = "You are an expert evaluator of AI-generated responses. \
Score every response to the user's prompt on three criteria, each from 0.0 to 1.0:\n\
- relevance: how well the response addresses the prompt (1.0 = fully).\n\
- clarity: how clear and well structured it is (1.0 = crystal clear).\n\
- hallucination_risk: how likely it contains made-up or incorrect claims (0.0 = very unlikely).\n\n\
Respond ONLY with JSON of this exact shape, one entry per response id:\n\
{\"scores\": {\"<response id>\": {\"relevance\": <float>, \"clarity\": <float>, \
\"hallucination_risk\": <float>, \"reasoning\": \"<brief explanation>\"}}}";

static FENCED_JSON: OnceLock<Option<Regex>> = OnceLock::new();

/// The model used as judge and how it is called.
#[derive(Clone)]
pub struct JudgeSettings {
    pub gateway: Arc<dyn ModelGateway>,
    pub model_id: String,
    pub params: ResolvedParams,
    pub timeout: Duration,
}

impl JudgeSettings {
    pub fn new(gateway: Arc<dyn ModelGateway>, model_id: impl Into<String>) -> Self {
        Self {
            gateway,
            model_id: model_id.into(),
            params: ResolvedParams {
                temperature: DEFAULT_JUDGE_TEMPERATURE,
                max_tokens: DEFAULT_JUDGE_MAX_TOKENS,
                ..ResolvedParams::default()
            },
            timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for JudgeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeSettings")
            .field("model_id", &self.model_id)
            .field("params", &self.params)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Asks the judge once for every candidate. Models the reply does not score
/// usably fall back to heuristic scoring, with the reason in `reasoning`.
pub(crate) async fn score(
    settings: &JudgeSettings,
    prompt: &str,
    context: Option<&str>,
    candidates: &[Candidate<'_>],
    weights: &ScoreWeights,
) -> Vec<EvaluationScore> {
    let request = GenerationRequest {
        prompt: build_prompt(prompt, context, candidates),
        system: Some(JUDGE_SYSTEM_PROMPT.to_string()),
        params: settings.params.clone(),
    };

    let cancel = CancellationToken::new();
    let call = settings
        .gateway
        .generate(&settings.model_id, &request, cancel.clone());
    let reply = match timeout(settings.timeout, call).await {
        Ok(Ok(generation)) => Ok(generation.text),
        Ok(Err(err)) => Err(format!("judge call failed: {err}")),
        Err(_) => {
            cancel.cancel();
            Err(format!(
                "judge call timed out after {} ms",
                settings.timeout.as_millis()
            ))
        }
    };
    let parsed = reply.and_then(|text| parse_reply(&text).map_err(|err| err.to_string()));
    if let Err(reason) = &parsed {
        log::warn!(
            "judge unusable, falling back to heuristic judge={} reason={reason}",
            settings.model_id
        );
    }

    candidates
        .iter()
        .map(|candidate| {
            let judged = parsed
                .as_ref()
                .ok()
                .and_then(|scores| judged_components(scores, candidate.model_id));
            match judged {
                Some((components, reasoning)) => EvaluationScore::from_components(
                    candidate.model_id,
                    components.relevance,
                    components.clarity,
                    components.hallucination_risk,
                    weights,
                    Some(reasoning),
                ),
                None => {
                    let reason = match &parsed {
                        Err(reason) => reason.clone(),
                        Ok(_) => "judge reply had no usable scores for this model".to_string(),
                    };
                    fallback(prompt, candidate, weights, &reason)
                }
            }
        })
        .collect()
}

fn fallback(
    prompt: &str,
    candidate: &Candidate<'_>,
    weights: &ScoreWeights,
    reason: &str,
) -> EvaluationScore {
    let mut score = heuristic::score(prompt, candidate, weights);
    let detail = score.reasoning.take().unwrap_or_default();
    score.reasoning = Some(format!("Heuristic fallback ({reason}): {detail}"));
    score
}

fn build_prompt(prompt: &str, context: Option<&str>, candidates: &[Candidate<'_>]) -> String {
    let mut out = format!("## User prompt\n{prompt}\n\n");
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        out.push_str("## Context provided to the models\n");
        out.push_str(&truncate(context, MAX_CONTEXT_CHARS));
        out.push_str("\n\n");
    }
    out.push_str("## Responses\n");
    for candidate in candidates {
        out.push_str(&format!(
            "### Response id: {}\n{}\n\n",
            candidate.model_id,
            truncate(candidate.text, MAX_RESPONSE_CHARS)
        ));
    }
    out.push_str("## Your evaluation (JSON only):");
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Reads the judge's reply as a map from model id to scores. Tries the raw
/// reply, then a fenced code block, then the outermost `{...}` span; a
/// top-level `scores` object is unwrapped.
pub(crate) fn parse_reply(reply: &str) -> Result<Map<String, Value>, EvaluationError> {
    for candidate in json_candidates(reply) {
        if let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(candidate) {
            return Ok(match map.remove("scores") {
                Some(Value::Object(scores)) => scores,
                Some(other) => {
                    map.insert("scores".to_string(), other);
                    map
                }
                None => map,
            });
        }
    }
    let preview: String = reply.chars().take(REPLY_PREVIEW_CHARS).collect();
    Err(EvaluationError::JudgeParse(preview))
}

fn json_candidates(reply: &str) -> Vec<&str> {
    let mut out = vec![reply.trim()];
    let fenced = FENCED_JSON
        .get_or_init(|| match Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```") {
            Ok(regex) => Some(regex),
            Err(err) => {
                log::error!("invalid judge fence pattern error={err}");
                None
            }
        })
        .as_ref()
        .and_then(|regex| regex.captures(reply))
        .and_then(|captures| captures.get(1));
    if let Some(block) = fenced {
        out.push(block.as_str());
    }
    if let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) {
        if start < end {
            out.push(&reply[start..=end]);
        }
    }
    out
}

fn judged_components(scores: &Map<String, Value>, model_id: &str) -> Option<(Components, String)> {
    let entry = scores.get(model_id)?.as_object()?;
    let number = |keys: &[&str]| keys.iter().find_map(|key| entry.get(*key)?.as_f64());
    let components = Components {
        relevance: number(&["relevance"])?,
        clarity: number(&["clarity"])?,
        hallucination_risk: number(&["hallucination_risk", "hallucinationRisk"])?,
    };
    let reasoning = entry
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("LLM judge evaluation")
        .to_string();
    Some((components, reasoning))
}
