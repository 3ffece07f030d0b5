use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::fan_out::{fan_out, Deadlines};
use super::{ContextSource, CoordinatorConfig, RequestCoordinator};
use crate::error::LentraError;
use crate::gateway::GenerationRequest;
use crate::prompt::{ErrorTag, PromptRequest, RagParams};
use crate::retrieval::{RetrievalAssembler, RetrievedChunk};
use crate::stream::{StreamEventType, StreamSession};
use crate::test_support::{ids, Script, ScriptedGateway, StaticRetriever};

fn config(per_call_ms: u64) -> CoordinatorConfig {
    CoordinatorConfig {
        per_call_timeout: Duration::from_millis(per_call_ms),
        global_slack: Duration::from_millis(500),
        ..CoordinatorConfig::default()
    }
}

fn coordinator(gateway: Arc<ScriptedGateway>, per_call_ms: u64) -> RequestCoordinator {
    RequestCoordinator::new(gateway, config(per_call_ms))
}

#[tokio::test(start_paused = true)]
async fn responses_follow_request_order_not_completion_order() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with("slow", Script::reply("s", 300))
            .with("medium", Script::reply("m", 200))
            .with("fast", Script::reply("f", 100)),
    );
    let outcome = coordinator(gateway, 5_000)
        .dispatch(&PromptRequest::new("hi", ["slow", "fast", "medium"]))
        .await
        .unwrap();

    let order: Vec<_> = outcome
        .responses
        .iter()
        .map(|r| r.model_id.as_str())
        .collect();
    assert_eq!(order, vec!["slow", "fast", "medium"]);
    assert_eq!(outcome.responses[0].text, "s");
    assert!(outcome.responses.iter().all(|r| !r.is_error()));
}

#[tokio::test(start_paused = true)]
async fn timeout_is_isolated_to_the_slow_model() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with("stuck", Script::Hang)
            .with("quick", Script::reply("done", 50)),
    );
    let outcome = coordinator(gateway.clone(), 1_000)
        .dispatch(&PromptRequest::new("hi", ["stuck", "quick"]))
        .await
        .unwrap();

    let stuck = &outcome.responses[0];
    assert_eq!(stuck.error, Some(ErrorTag::Timeout));
    assert!(stuck.text.is_empty());
    assert!(stuck.latency_ms >= 1_000 && stuck.latency_ms < 1_100);

    let quick = &outcome.responses[1];
    assert_eq!(quick.error, None);
    assert!(quick.latency_ms >= 50 && quick.latency_ms < 60);
    assert_eq!(gateway.cancelled(), 1);
}

#[tokio::test(start_paused = true)]
async fn global_deadline_cancels_remaining_calls() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with("a", Script::reply("ok", 10))
            .with("b", Script::Hang),
    );
    let responses = fan_out(
        gateway.clone(),
        &ids(&["a", "b"]),
        Arc::new(GenerationRequest::new("hi")),
        Deadlines {
            per_call: Duration::from_secs(60),
            global: Duration::from_millis(300),
        },
        CancellationToken::new(),
    )
    .await;

    assert_eq!(responses[0].error, None);
    assert_eq!(responses[1].error, Some(ErrorTag::Cancelled));
    assert!(responses[1].latency_ms >= 300);
    assert_eq!(gateway.cancelled(), 2);
}

#[tokio::test(start_paused = true)]
async fn caller_cancellation_reaches_every_call() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with("a", Script::Hang)
            .with("b", Script::Hang),
    );
    let coordinator = coordinator(gateway.clone(), 60_000);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = coordinator
        .dispatch_with_cancel(&PromptRequest::new("hi", ["a", "b"]), cancel)
        .await
        .unwrap();

    assert!(outcome
        .responses
        .iter()
        .all(|r| r.error == Some(ErrorTag::Cancelled)));
    assert!(outcome.total_latency_ms < 1_000);
    assert_eq!(gateway.cancelled(), 2);
}

#[tokio::test(start_paused = true)]
async fn duplicate_ids_call_the_backend_once() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with("a", Script::reply("A", 10))
            .with("b", Script::reply("B", 10)),
    );
    let outcome = coordinator(gateway.clone(), 1_000)
        .dispatch(&PromptRequest::new("hi", ["a", "b", "a"]))
        .await
        .unwrap();

    assert_eq!(gateway.calls("a"), 1);
    assert_eq!(outcome.responses.len(), 3);
    assert_eq!(outcome.responses[0], outcome.responses[2]);
}

#[tokio::test(start_paused = true)]
async fn every_model_failing_still_returns_one_response_each() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with("a", Script::Fail("a down".into()))
            .with("b", Script::Fail("b down".into())),
    );
    let outcome = coordinator(gateway, 1_000)
        .dispatch(&PromptRequest::new("hi", ["a", "b", "missing"]))
        .await
        .unwrap();

    assert_eq!(outcome.responses.len(), 3);
    assert!(outcome
        .responses
        .iter()
        .all(|r| r.error == Some(ErrorTag::AdapterError)));
    assert_eq!(
        outcome.responses[0].error_detail.as_deref(),
        Some("Provider error: a down")
    );
}

#[rstest]
#[case::empty_prompt(PromptRequest::new("  ", ["a"]))]
#[case::no_models(PromptRequest::new("hi", Vec::<String>::new()))]
#[tokio::test]
async fn invalid_requests_are_rejected_before_dispatch(#[case] request: PromptRequest) {
    let gateway = Arc::new(ScriptedGateway::new().with("a", Script::reply("x", 1)));
    let result = coordinator(gateway.clone(), 1_000).dispatch(&request).await;

    assert!(matches!(result, Err(LentraError::Validation(_))));
    assert_eq!(gateway.calls("a"), 0);
}

#[tokio::test(start_paused = true)]
async fn retrieved_context_is_composed_into_the_prompt() {
    let gateway = Arc::new(ScriptedGateway::new().with("a", Script::reply("x", 1)));
    let retriever = StaticRetriever::with_chunks(vec![
        RetrievedChunk::new("1", "Paris is in France.", 0.9),
        RetrievedChunk::new("2", "noise", 0.1),
    ]);
    let coordinator = coordinator(gateway.clone(), 1_000)
        .with_retrieval(RetrievalAssembler::new(Arc::new(retriever)));

    let outcome = coordinator
        .dispatch(&PromptRequest::new("Where is Paris?", ["a"]).use_rag(true))
        .await
        .unwrap();

    let context = outcome.context.unwrap();
    assert_eq!(context.source, ContextSource::Retrieval);
    assert_eq!(context.chunks.len(), 1);
    assert!(!outcome.rag_degraded);

    let sent = gateway.last_request().unwrap();
    assert!(sent.prompt.contains("[Source 1]: Paris is in France."));
    assert!(sent.prompt.contains("Question: Where is Paris?"));
}

#[tokio::test(start_paused = true)]
async fn retrieval_failure_degrades_by_default() {
    let gateway = Arc::new(ScriptedGateway::new().with("a", Script::reply("x", 1)));
    let coordinator = coordinator(gateway.clone(), 1_000).with_retrieval(RetrievalAssembler::new(
        Arc::new(StaticRetriever::failing("index offline")),
    ));

    let outcome = coordinator
        .dispatch(&PromptRequest::new("q", ["a"]).use_rag(true))
        .await
        .unwrap();

    assert!(outcome.rag_degraded);
    assert!(outcome.context.is_none());
    assert_eq!(gateway.last_request().unwrap().prompt, "q");
}

#[tokio::test(start_paused = true)]
async fn retrieval_failure_is_fatal_when_required() {
    let gateway = Arc::new(ScriptedGateway::new().with("a", Script::reply("x", 1)));
    let coordinator = RequestCoordinator::new(
        gateway.clone(),
        CoordinatorConfig {
            rag_required: true,
            ..config(1_000)
        },
    )
    .with_retrieval(RetrievalAssembler::new(Arc::new(StaticRetriever::failing(
        "index offline",
    ))));

    let result = coordinator
        .dispatch(
            &PromptRequest::new("q", ["a"])
                .use_rag(true)
                .rag(RagParams::default()),
        )
        .await;

    assert!(matches!(result, Err(LentraError::Retrieval(_))));
    assert_eq!(gateway.calls("a"), 0);
}

#[tokio::test(start_paused = true)]
async fn direct_context_skips_retrieval() {
    let gateway = Arc::new(ScriptedGateway::new().with("a", Script::reply("x", 1)));
    let coordinator = coordinator(gateway.clone(), 1_000).with_retrieval(RetrievalAssembler::new(
        Arc::new(StaticRetriever::failing("should not be called")),
    ));

    let outcome = coordinator
        .dispatch(
            &PromptRequest::new("q", ["a"])
                .use_rag(true)
                .context_text("given facts"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.context.unwrap().source, ContextSource::Direct);
    assert!(!outcome.rag_degraded);
    assert!(gateway.last_request().unwrap().prompt.contains("given facts"));
}

#[tokio::test(start_paused = true)]
async fn streaming_dispatch_reports_the_same_responses() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with("a", Script::chunks(&["he", "llo"], 10, true))
            .with("b", Script::reply("hey", 20)),
    );
    let coordinator = coordinator(gateway, 1_000);
    let (tx, mut rx) = mpsc::channel(64);
    let mut session = StreamSession::new(Uuid::new_v4());

    let outcome = coordinator
        .dispatch_streaming(
            &PromptRequest::new("hi", ["a", "b"]).stream(true),
            &mut session,
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.request_id, session.request_id());
    assert_eq!(outcome.responses[0].text, "hello");
    assert_eq!(outcome.responses[1].text, "hey");

    let mut kinds = Vec::new();
    while let Some(event) = rx.recv().await {
        kinds.push(event.kind);
    }
    assert_eq!(kinds.first(), Some(&StreamEventType::StreamStart));
    assert_eq!(kinds.last(), Some(&StreamEventType::StreamEnd));
}
