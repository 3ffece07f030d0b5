use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;

use super::EvaluationEngine;
use crate::evaluation::{
    Embedder, EnsembleConfig, EvaluationError, EvaluationMode, EvaluationRequest, JudgeSettings,
    ScoreWeights,
};
use crate::prompt::{ErrorTag, ModelResponse};
use crate::test_support::{Script, ScriptedGateway};

fn two_plus_two() -> Vec<ModelResponse> {
    vec![
        ModelResponse::success("a", "4", 120, 3),
        ModelResponse::success("b", "The answer is four.", 300, 6),
    ]
}

struct FixedEmbedder(HashMap<String, Vec<f32>>);

impl FixedEmbedder {
    fn new(entries: &[(&str, [f32; 2])]) -> Self {
        Self(
            entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.to_vec()))
                .collect(),
        )
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EvaluationError> {
        texts
            .iter()
            .map(|t| {
                self.0
                    .get(t)
                    .cloned()
                    .ok_or_else(|| EvaluationError::Embedding(format!("no vector for {t}")))
            })
            .collect()
    }
}

fn judge(reply: &str) -> JudgeSettings {
    let gateway = Arc::new(ScriptedGateway::new().with("judge", Script::reply(reply, 5)));
    JudgeSettings::new(gateway, "judge")
}

#[tokio::test]
async fn heuristic_prefers_the_faster_equally_relevant_answer() {
    let result = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new(
            "2+2?",
            two_plus_two(),
            EvaluationMode::Heuristic,
        ))
        .await
        .unwrap();

    assert_eq!(result.scores.len(), 2);
    let (a, b) = (&result.scores[0], &result.scores[1]);
    assert_eq!(a.model_id, "a");
    assert!(a.relevance >= b.relevance);
    assert_eq!(result.winner.as_deref(), Some("a"));
    assert!(!result.is_tie);
    assert_eq!(result.ranking, vec!["a", "b"]);
}

#[tokio::test]
async fn heuristic_is_idempotent() {
    let engine = EvaluationEngine::new();
    let request = EvaluationRequest::new(
        "Explain ownership in Rust",
        vec![
            ModelResponse::success("x", "# Ownership\n\n- moves\n- borrows", 800, 9),
            ModelResponse::success("y", "I think it is probably about memory.", 400, 8),
        ],
        EvaluationMode::Heuristic,
    );
    let first = engine.evaluate(&request).await.unwrap();
    let second = engine.evaluate(&request).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first.scores).unwrap(),
        serde_json::to_string(&second.scores).unwrap()
    );
}

#[tokio::test]
async fn only_errors_is_no_responses() {
    let responses = vec![
        ModelResponse::failure("a", ErrorTag::Timeout, 60_000, None),
        ModelResponse::failure("b", ErrorTag::AdapterError, 12, None),
    ];
    let result = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new("hi", responses, EvaluationMode::Heuristic))
        .await;
    assert_eq!(result, Err(EvaluationError::NoResponses));
}

#[tokio::test]
async fn errors_are_excluded_from_scores() {
    let mut responses = two_plus_two();
    responses.push(ModelResponse::failure("c", ErrorTag::Timeout, 60_000, None));
    let result = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new("2+2?", responses, EvaluationMode::Heuristic))
        .await
        .unwrap();
    assert!(result.scores.iter().all(|s| s.model_id != "c"));
    assert!(!result.ranking.contains(&"c".to_string()));
}

#[tokio::test]
async fn single_response_wins_alone() {
    let result = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new(
            "hi",
            vec![ModelResponse::success("solo", "hello there", 50, 2)],
            EvaluationMode::Heuristic,
        ))
        .await
        .unwrap();
    assert_eq!(result.winner.as_deref(), Some("solo"));
    assert!(!result.is_tie);
}

#[tokio::test]
async fn identical_answers_tie() {
    let responses = vec![
        ModelResponse::success("a", "same text", 100, 2),
        ModelResponse::success("b", "same text", 100, 2),
    ];
    let result = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new("q", responses, EvaluationMode::Heuristic))
        .await
        .unwrap();
    assert!(result.is_tie);
    assert_eq!(result.winner, None);
}

#[tokio::test]
async fn human_vote_waits_for_a_ballot() {
    let result = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new(
            "2+2?",
            two_plus_two(),
            EvaluationMode::HumanVote,
        ))
        .await
        .unwrap();
    assert!(result.awaiting_vote);
    assert_eq!(result.winner, None);
    assert!(!result.is_tie);
    assert!(result.ranking.is_empty());
    assert!(result.scores.iter().all(|s| s.final_score == 0.0));
}

#[tokio::test]
async fn embedding_uses_the_reference_text() {
    let embedder = FixedEmbedder::new(&[
        ("reference", [1.0, 0.0]),
        ("close", [1.0, 0.0]),
        ("opposite", [-1.0, 0.0]),
    ]);
    let engine = EvaluationEngine::new().with_embedder(Arc::new(embedder));
    let request = EvaluationRequest::new(
        "prompt without a vector",
        vec![
            ModelResponse::success("near", "close", 10, 1),
            ModelResponse::success("far", "opposite", 10, 1),
        ],
        EvaluationMode::EmbeddingSimilarity,
    )
    .reference_text("reference");

    let result = engine.evaluate(&request).await.unwrap();
    assert!((result.scores[0].relevance - 1.0).abs() < 1e-9);
    assert!(result.scores[1].relevance.abs() < 1e-9);
    assert!((result.scores[1].hallucination_risk - 1.0).abs() < 1e-9);
    assert_eq!(result.winner.as_deref(), Some("near"));
}

#[tokio::test]
async fn embedding_without_embedder_fails() {
    let result = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new(
            "q",
            two_plus_two(),
            EvaluationMode::EmbeddingSimilarity,
        ))
        .await;
    assert_eq!(result, Err(EvaluationError::MissingEmbedder));
}

#[tokio::test]
async fn judge_scores_and_per_model_fallback() {
    let reply = r#"{"scores": {"a": {"relevance": 0.9, "clarity": 0.8, "hallucination_risk": 0.1, "reasoning": "correct"}}}"#;
    let engine = EvaluationEngine::new().with_judge(judge(reply));
    let result = engine
        .evaluate(&EvaluationRequest::new(
            "2+2?",
            two_plus_two(),
            EvaluationMode::LlmJudge,
        ))
        .await
        .unwrap();

    let a = &result.scores[0];
    assert_eq!(a.relevance, 0.9);
    assert_eq!(a.reasoning.as_deref(), Some("correct"));
    let b = &result.scores[1];
    assert!(b
        .reasoning
        .as_deref()
        .unwrap()
        .starts_with("Heuristic fallback"));
}

#[tokio::test]
async fn request_can_name_its_own_judge() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with("judge", Script::reply("not json", 5))
            .with(
                "strict",
                Script::reply(r#"{"a": {"relevance": 0.1, "clarity": 0.1, "hallucination_risk": 0.9}, "b": {"relevance": 0.9, "clarity": 0.9, "hallucination_risk": 0.0}}"#, 5),
            ),
    );
    let engine = EvaluationEngine::new().with_judge(JudgeSettings::new(gateway, "judge"));
    let result = engine
        .evaluate(
            &EvaluationRequest::new("2+2?", two_plus_two(), EvaluationMode::LlmJudge)
                .judge_model("strict"),
        )
        .await
        .unwrap();

    assert_eq!(result.winner.as_deref(), Some("b"));
    assert_eq!(result.scores[1].relevance, 0.9);
}

#[tokio::test]
async fn unreadable_judge_falls_back_for_everyone() {
    let engine = EvaluationEngine::new().with_judge(judge("Both are fine, honestly."));
    let result = engine
        .evaluate(&EvaluationRequest::new(
            "2+2?",
            two_plus_two(),
            EvaluationMode::LlmJudge,
        ))
        .await
        .unwrap();

    let heuristic = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new(
            "2+2?",
            two_plus_two(),
            EvaluationMode::Heuristic,
        ))
        .await
        .unwrap();
    for (judged, plain) in result.scores.iter().zip(&heuristic.scores) {
        assert_eq!(judged.final_score, plain.final_score);
        assert!(judged.reasoning.as_deref().unwrap().contains("could not be parsed"));
    }
}

#[tokio::test]
async fn ensemble_final_score_is_the_mean_of_its_modes() {
    let reply = r#"{"a": {"relevance": 0.2, "clarity": 0.4, "hallucination_risk": 0.6}, "b": {"relevance": 1.0, "clarity": 1.0, "hallucination_risk": 0.0}}"#;
    let engine = EvaluationEngine::new().with_judge(judge(reply));
    let run = |mode| {
        let engine = engine.clone();
        async move {
            engine
                .evaluate(&EvaluationRequest::new("2+2?", two_plus_two(), mode))
                .await
                .unwrap()
        }
    };

    let heuristic = run(EvaluationMode::Heuristic).await;
    let judged = run(EvaluationMode::LlmJudge).await;
    let ensemble = run(EvaluationMode::Ensemble).await;

    for i in 0..2 {
        let expected = 0.5 * heuristic.scores[i].final_score + 0.5 * judged.scores[i].final_score;
        assert!((ensemble.scores[i].final_score - expected).abs() < 1e-12);
        let expected_relevance =
            0.5 * heuristic.scores[i].relevance + 0.5 * judged.scores[i].relevance;
        assert!((ensemble.scores[i].relevance - expected_relevance).abs() < 1e-12);
    }
    assert_eq!(ensemble.winner.as_deref(), Some("b"));
}

#[tokio::test]
async fn ensemble_needs_two_modes() {
    let result = EvaluationEngine::new()
        .evaluate(&EvaluationRequest::new(
            "q",
            two_plus_two(),
            EvaluationMode::Ensemble,
        ))
        .await;
    assert!(matches!(result, Err(EvaluationError::InvalidEnsemble(_))));

    let explicit = EvaluationRequest::new("q", two_plus_two(), EvaluationMode::Ensemble)
        .ensemble(EnsembleConfig::equal(&[
            EvaluationMode::Heuristic,
            EvaluationMode::EmbeddingSimilarity,
        ]));
    assert_eq!(
        EvaluationEngine::new().evaluate(&explicit).await,
        Err(EvaluationError::MissingEmbedder)
    );
}

#[tokio::test]
async fn invalid_weights_are_rejected() {
    let request = EvaluationRequest::new("q", two_plus_two(), EvaluationMode::Heuristic).weights(
        ScoreWeights {
            relevance: f64::NAN,
            ..ScoreWeights::default()
        },
    );
    assert!(matches!(
        EvaluationEngine::new().evaluate(&request).await,
        Err(EvaluationError::InvalidWeights(_))
    ));
}

proptest! {
    #[test]
    fn scores_stay_in_unit_range(
        prompt in "[a-zA-Z0-9 ?]{1,60}",
        texts in proptest::collection::vec(".{0,200}", 1..5),
        latency in 0u64..600_000,
        wr in 0.0f64..5.0,
        wc in 0.0f64..5.0,
        wh in 0.01f64..5.0,
    ) {
        let responses: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| ModelResponse::success(format!("m{i}"), text.clone(), latency + i as u64, 1))
            .collect();
        let request = EvaluationRequest::new(prompt, responses, EvaluationMode::Heuristic)
            .weights(ScoreWeights { relevance: wr, clarity: wc, hallucination: wh });
        let result = futures::executor::block_on(EvaluationEngine::new().evaluate(&request)).unwrap();
        for score in &result.scores {
            for value in [score.relevance, score.clarity, score.hallucination_risk, score.final_score] {
                prop_assert!((0.0..=1.0).contains(&value));
            }
        }
        if let Some(winner) = &result.winner {
            let best = result.scores.iter().map(|s| s.final_score).fold(f64::MIN, f64::max);
            let top = result.scores.iter().find(|s| &s.model_id == winner).unwrap();
            prop_assert_eq!(top.final_score, best);
        }
    }
}
