#![cfg(feature = "ollama")]

use std::sync::Arc;

use mockito::{Matcher, Server};
use serde_json::json;

use lentra::backends::ollama::{OllamaConfig, OllamaEmbedder, OllamaFactory};
use lentra::{
    AdapterPool, CoordinatorConfig, ErrorTag, EvaluationEngine, EvaluationMode,
    EvaluationRequest, PromptRequest, RequestCoordinator,
};

fn config(server: &Server) -> OllamaConfig {
    OllamaConfig {
        base_url: server.url(),
        timeout_secs: 5,
        keep_alive: None,
    }
}

async fn mock_model(server: &mut Server, model: &str, answer: &str, eval_count: u32) {
    server
        .mock("POST", "/api/show")
        .match_body(Matcher::Json(json!({"model": model})))
        .with_body(json!({"details": {"family": "test"}}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({"model": model, "stream": false})))
        .with_body(json!({"response": answer, "done": true, "eval_count": eval_count}).to_string())
        .create_async()
        .await;
}

#[tokio::test]
async fn ollama_models_are_dispatched_and_ranked_by_embedding() {
    let mut server = Server::new_async().await;
    mock_model(&mut server, "llama3", "Paris", 1).await;
    mock_model(&mut server, "mistral", "The capital of France is Paris.", 7).await;
    server
        .mock("POST", "/api/show")
        .match_body(Matcher::Json(json!({"model": "ghost"})))
        .with_status(404)
        .with_body(json!({"error": "model 'ghost' not found"}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/api/embed")
        .match_body(Matcher::PartialJson(json!({"model": "nomic-embed-text"})))
        .with_body(json!({"embeddings": [[1.0, 0.0], [1.0, 0.0], [0.0, 1.0]]}).to_string())
        .create_async()
        .await;

    let pool = AdapterPool::new(Arc::new(OllamaFactory::new(config(&server)).unwrap()));
    let coordinator = RequestCoordinator::new(Arc::new(pool), CoordinatorConfig::default());
    let request = PromptRequest::new("Capital of France?", ["llama3", "ghost", "mistral"]);
    let outcome = coordinator.dispatch(&request).await.unwrap();

    assert_eq!(outcome.responses[0].text, "Paris");
    assert_eq!(outcome.responses[0].token_count, 1);
    assert_eq!(outcome.responses[1].error, Some(ErrorTag::AdapterError));
    assert!(outcome.responses[1]
        .error_detail
        .as_deref()
        .unwrap()
        .contains("ghost"));
    assert_eq!(outcome.responses[2].token_count, 7);

    let embedder = OllamaEmbedder::new("nomic-embed-text", config(&server)).unwrap();
    let engine = EvaluationEngine::new().with_embedder(Arc::new(embedder));
    let result = engine
        .evaluate(
            &EvaluationRequest::new(
                "Capital of France?",
                outcome.responses,
                EvaluationMode::EmbeddingSimilarity,
            )
            .reference_text("Paris is the capital of France."),
        )
        .await
        .unwrap();

    assert_eq!(result.winner.as_deref(), Some("llama3"));
    assert_eq!(result.ranking, vec!["llama3", "mistral"]);
    assert!(!result.is_tie);
}
