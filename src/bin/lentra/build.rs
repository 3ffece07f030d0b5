use std::sync::Arc;

use anyhow::Context;

use lentra::api::ServerState;
use lentra::backends::ollama::{OllamaEmbedder, OllamaFactory};
use lentra::config::AppConfig;
use lentra::evaluation::{BallotBox, EvaluationEngine, JudgeSettings};
use lentra::gateway::{AdapterPool, ModelGateway, ResilientGateway};
use lentra::{RequestCoordinator, ResponseAggregator};

/// Wires the Ollama-backed gateway, coordinator, engine and stores.
pub fn build_state(config: &AppConfig) -> anyhow::Result<ServerState> {
    let factory = OllamaFactory::new(config.ollama.clone()).context("building Ollama client")?;
    let pool: Arc<dyn ModelGateway> = Arc::new(AdapterPool::new(Arc::new(factory)));
    let gateway: Arc<dyn ModelGateway> = match config.coordinator.resilience() {
        Some(retry) => Arc::new(ResilientGateway::new(pool, retry)),
        None => pool,
    };

    let coordinator = RequestCoordinator::new(gateway.clone(), config.coordinator.to_runtime());

    let mut engine = EvaluationEngine::new()
        .with_weights(config.evaluation.weights)
        .with_ensemble(config.evaluation.ensemble.clone());
    if let Some(judge) = &config.evaluation.judge_model {
        engine = engine.with_judge(
            JudgeSettings::new(gateway.clone(), judge.clone())
                .timeout(config.evaluation.judge_timeout()),
        );
    }
    if let Some(model) = &config.evaluation.embedding_model {
        let embedder = OllamaEmbedder::new(model.clone(), config.ollama.clone())
            .context("building Ollama embedder")?;
        engine = engine.with_embedder(Arc::new(embedder));
    }

    log::info!(
        "service ready ollama={} judge={:?} embedder={:?} default_mode={}",
        config.ollama.base_url,
        config.evaluation.judge_model,
        config.evaluation.embedding_model,
        config.evaluation.default_mode
    );
    Ok(ServerState::new(coordinator, engine)
        .with_aggregator(ResponseAggregator::new(config.history.capacity()?))
        .with_ballots(BallotBox::new(config.evaluation.ballot_ttl()))
        .with_default_mode(config.evaluation.default_mode))
}
