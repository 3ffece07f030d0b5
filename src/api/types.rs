//! Wire schema. Fields are snake_case on output; camelCase aliases are
//! accepted on input and translated here, nowhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::{AssembledContext, DispatchOutcome};
use crate::evaluation::{
    EnsembleConfig, EvaluationMode, EvaluationRequest, EvaluationResult, ScoreWeights,
};
use crate::gateway::ModelInfo;
use crate::history::Exchange;
use crate::prompt::{
    ErrorTag, GenerationParams, ModelResponse, Persona, PromptRequest, RagParams,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParamsBody {
    pub temperature: Option<f32>,
    #[serde(alias = "maxTokens")]
    pub max_tokens: Option<u32>,
    #[serde(alias = "topP")]
    pub top_p: Option<f32>,
    #[serde(alias = "topK")]
    pub top_k: Option<u32>,
    #[serde(alias = "repeatPenalty")]
    pub repeat_penalty: Option<f32>,
    #[serde(alias = "presencePenalty")]
    pub presence_penalty: Option<f32>,
    #[serde(alias = "frequencyPenalty")]
    pub frequency_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl From<ParamsBody> for GenerationParams {
    fn from(body: ParamsBody) -> Self {
        GenerationParams {
            temperature: body.temperature,
            max_tokens: body.max_tokens,
            top_p: body.top_p,
            top_k: body.top_k,
            repeat_penalty: body.repeat_penalty,
            presence_penalty: body.presence_penalty,
            frequency_penalty: body.frequency_penalty,
            stop: body.stop,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaBody {
    pub name: String,
    #[serde(alias = "systemPrompt")]
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagBody {
    #[serde(default, alias = "topK")]
    pub top_k: Option<usize>,
    #[serde(default, alias = "scoreThreshold")]
    pub score_threshold: Option<f64>,
    #[serde(default)]
    pub collection: Option<String>,
}

impl From<RagBody> for RagParams {
    fn from(body: RagBody) -> Self {
        let defaults = RagParams::default();
        RagParams {
            top_k: body.top_k.unwrap_or(defaults.top_k),
            score_threshold: body.score_threshold.unwrap_or(defaults.score_threshold),
            collection: body.collection,
        }
    }
}

/// `POST /prompt` body, also the `prompt` message on `/ws/prompt`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptBody {
    pub prompt: String,
    #[serde(alias = "modelIds")]
    pub model_ids: Vec<String>,
    #[serde(default)]
    pub persona: Option<PersonaBody>,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(default, alias = "instructionPrompt")]
    pub instruction_prompt: Option<String>,
    #[serde(default, alias = "contextText")]
    pub context_text: Option<String>,
    #[serde(default, alias = "params", alias = "generationParams")]
    pub generation_params: ParamsBody,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, alias = "useRag")]
    pub use_rag: bool,
    #[serde(default, alias = "ragParams", alias = "rag_params")]
    pub rag: Option<RagBody>,
}

impl From<PromptBody> for PromptRequest {
    fn from(body: PromptBody) -> Self {
        let mut request = PromptRequest::new(body.prompt, body.model_ids)
            .params(body.generation_params.into())
            .stream(body.stream)
            .use_rag(body.use_rag);
        request.persona = body.persona.map(|p| Persona {
            name: p.name,
            system_prompt: p.system_prompt,
        });
        request.system_prompt = body.system_prompt;
        request.instruction_prompt = body.instruction_prompt;
        request.context_text = body.context_text;
        request.rag = body.rag.map(Into::into);
        request
    }
}

/// One model's slot on the wire. `text` and `tokens` are read as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseItem {
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(alias = "text")]
    pub response_text: String,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default, alias = "tokens")]
    pub token_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl From<ModelResponse> for ResponseItem {
    fn from(response: ModelResponse) -> Self {
        Self {
            model_name: response.model_id.clone(),
            model_id: response.model_id,
            response_text: response.text,
            latency_ms: response.latency_ms,
            token_count: response.token_count,
            error: response.error,
            error_detail: response.error_detail,
        }
    }
}

impl From<ResponseItem> for ModelResponse {
    fn from(item: ResponseItem) -> Self {
        ModelResponse {
            model_id: item.model_id,
            text: item.response_text,
            latency_ms: item.latency_ms,
            token_count: item.token_count,
            error: item.error,
            error_detail: item.error_detail,
        }
    }
}

fn into_responses(items: Vec<ResponseItem>) -> Vec<ModelResponse> {
    items.into_iter().map(Into::into).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptReply {
    pub request_id: Uuid,
    pub prompt: String,
    pub responses: Vec<ResponseItem>,
    pub created_at: DateTime<Utc>,
    /// History entry holding this exchange; pass it to `/evaluate` to attach scores.
    pub exchange_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AssembledContext>,
    pub rag_degraded: bool,
    pub total_latency_ms: u64,
}

impl PromptReply {
    pub fn new(exchange: &Exchange, outcome: DispatchOutcome) -> Self {
        Self {
            request_id: outcome.request_id,
            prompt: exchange.prompt.clone(),
            responses: outcome.responses.into_iter().map(Into::into).collect(),
            created_at: exchange.timestamp,
            exchange_id: exchange.id,
            context: outcome.context,
            rag_degraded: outcome.rag_degraded,
            total_latency_ms: outcome.total_latency_ms,
        }
    }
}

/// `POST /evaluate` body.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateBody {
    pub prompt: String,
    pub responses: Vec<ResponseItem>,
    #[serde(default, alias = "evaluationMode", alias = "evaluation_mode")]
    pub mode: Option<EvaluationMode>,
    #[serde(
        default,
        alias = "referenceText",
        alias = "referenceAnswer",
        alias = "reference_answer"
    )]
    pub reference_text: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub weights: Option<ScoreWeights>,
    #[serde(default)]
    pub ensemble: Option<EnsembleConfig>,
    /// Extra points for the judge to weigh; shown to it after the context.
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default, alias = "judgeModelId", alias = "judge_model")]
    pub judge_model_id: Option<String>,
    #[serde(default, alias = "exchangeId")]
    pub exchange_id: Option<Uuid>,
}

impl EvaluateBody {
    pub fn into_request(self, default_mode: EvaluationMode) -> (EvaluationRequest, Option<Uuid>) {
        let mut request = EvaluationRequest::new(
            self.prompt,
            into_responses(self.responses),
            self.mode.unwrap_or(default_mode),
        );
        request.reference_text = self.reference_text;
        request.context = judge_context(self.context, &self.criteria);
        request.weights = self.weights;
        request.ensemble = self.ensemble;
        request.judge_model = self.judge_model_id;
        (request, self.exchange_id)
    }
}

fn judge_context(context: Option<String>, criteria: &[String]) -> Option<String> {
    if criteria.is_empty() {
        return context;
    }
    let mut text = context.unwrap_or_default();
    if !text.is_empty() {
        text.push_str("\n\n");
    }
    text.push_str("Also consider:");
    for criterion in criteria {
        text.push_str("\n- ");
        text.push_str(criterion);
    }
    Some(text)
}

/// Reply to `/evaluate` and `/evaluate/vote`.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReply {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub result: EvaluationResult,
    pub evaluated_at: DateTime<Utc>,
}

impl From<EvaluationResult> for EvaluationReply {
    fn from(result: EvaluationResult) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            result,
            evaluated_at: Utc::now(),
        }
    }
}

/// `POST /evaluate/ballot` body.
#[derive(Debug, Clone, Deserialize)]
pub struct BallotBody {
    pub prompt: String,
    pub responses: Vec<ResponseItem>,
}

impl BallotBody {
    pub fn into_parts(self) -> (String, Vec<ModelResponse>) {
        (self.prompt, into_responses(self.responses))
    }
}

/// `POST /evaluate/vote` body.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteBody {
    #[serde(alias = "ballotId")]
    pub ballot_id: Uuid,
    #[serde(
        alias = "optionIndex",
        alias = "option_index",
        alias = "selectedOption",
        alias = "selected_option"
    )]
    pub option: usize,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default, alias = "exchangeId")]
    pub exchange_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryReply {
    pub exchanges: Vec<Exchange>,
    pub total: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsReply {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReply {
    pub status: &'static str,
    pub version: &'static str,
    pub history_len: usize,
    pub open_ballots: usize,
}

/// Messages a client may send on `/ws/prompt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Prompt(PromptBody),
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_aliases_are_accepted() {
        let body: PromptBody = serde_json::from_str(
            r#"{
                "prompt": "hi",
                "modelIds": ["a", "b"],
                "useRag": true,
                "ragParams": {"topK": 3},
                "systemPrompt": "Be terse.",
                "params": {"maxTokens": 64}
            }"#,
        )
        .unwrap();
        let request = PromptRequest::from(body);
        assert_eq!(request.model_ids, vec!["a", "b"]);
        assert!(request.use_rag);
        assert_eq!(request.rag.as_ref().map(|r| r.top_k), Some(3));
        assert_eq!(request.rag.as_ref().map(|r| r.score_threshold), Some(0.3));
        assert_eq!(request.system_prompt.as_deref(), Some("Be terse."));
        assert_eq!(request.params.max_tokens, Some(64));
    }

    #[test]
    fn evaluate_body_falls_back_to_default_mode() {
        let body: EvaluateBody = serde_json::from_str(
            r#"{"prompt": "p", "responses": [], "referenceAnswer": "ref", "exchangeId": "00000000-0000-0000-0000-000000000000"}"#,
        )
        .unwrap();
        let (request, exchange) = body.into_request(EvaluationMode::Ensemble);
        assert_eq!(request.mode, EvaluationMode::Ensemble);
        assert_eq!(request.reference_text.as_deref(), Some("ref"));
        assert_eq!(exchange, Some(Uuid::nil()));
    }

    #[test]
    fn original_field_names_are_read_as_aliases() {
        let body: PromptBody = serde_json::from_str(
            r#"{"prompt": "hi", "model_ids": ["a"], "params": {"temperature": 0.4}, "stream": true}"#,
        )
        .unwrap();
        let request = PromptRequest::from(body);
        assert_eq!(request.params.temperature, Some(0.4));
        assert!(request.stream);

        let item: ResponseItem =
            serde_json::from_str(r#"{"model_id": "a", "text": "4", "tokens": 1}"#).unwrap();
        let response = ModelResponse::from(item);
        assert_eq!(response.text, "4");
        assert_eq!(response.token_count, 1);

        let vote: VoteBody = serde_json::from_str(
            r#"{"ballot_id": "00000000-0000-0000-0000-000000000000", "selected_option": 2}"#,
        )
        .unwrap();
        assert_eq!(vote.option, 2);
    }

    #[test]
    fn criteria_and_judge_model_reach_the_request() {
        let body: EvaluateBody = serde_json::from_str(
            r#"{
                "prompt": "p",
                "responses": [],
                "mode": "llm_judge",
                "context": "Paris is in France.",
                "criteria": ["cites a source", "under 50 words"],
                "judge_model_id": "strict"
            }"#,
        )
        .unwrap();
        let (request, _) = body.into_request(EvaluationMode::Heuristic);
        assert_eq!(request.judge_model.as_deref(), Some("strict"));
        assert_eq!(
            request.context.as_deref(),
            Some("Paris is in France.\n\nAlso consider:\n- cites a source\n- under 50 words")
        );
    }

    #[test]
    fn evaluation_reply_flattens_the_result() {
        let result = EvaluationResult {
            mode: EvaluationMode::Heuristic,
            scores: Vec::new(),
            winner: Some("a".to_string()),
            is_tie: false,
            ranking: vec!["a".to_string()],
            awaiting_vote: false,
            reasoning: None,
        };
        let value = serde_json::to_value(EvaluationReply::from(result)).unwrap();
        assert_eq!(value["winner"], "a");
        assert_eq!(value["mode"], "heuristic");
        assert!(value["request_id"].is_string());
        assert!(value["evaluated_at"].is_string());
        assert!(value.get("result").is_none());
    }

    #[test]
    fn client_messages_are_tagged() {
        let ping: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));
        let prompt: ClientMessage =
            serde_json::from_str(r#"{"type": "prompt", "prompt": "hi", "model_ids": ["a"]}"#)
                .unwrap();
        assert!(matches!(prompt, ClientMessage::Prompt(body) if body.model_ids == ["a"]));
    }
}
