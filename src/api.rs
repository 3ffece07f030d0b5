//! HTTP and WebSocket transport over the orchestration core.
//!
//! Handlers translate wire types from [`types`] into core calls and map
//! [`crate::LentraError`] onto status codes; nothing else in the crate knows
//! about HTTP.

#[path = "api/types.rs"]
pub mod types;

#[path = "api/handlers.rs"]
mod handlers;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::coordinator::RequestCoordinator;
use crate::evaluation::{BallotBox, EvaluationEngine, EvaluationMode};
use crate::history::ResponseAggregator;

/// Shared handles every handler works against.
#[derive(Clone)]
pub struct ServerState {
    pub coordinator: Arc<RequestCoordinator>,
    pub engine: Arc<EvaluationEngine>,
    pub aggregator: Arc<ResponseAggregator>,
    pub ballots: Arc<BallotBox>,
    /// Used when an evaluate request names no mode.
    pub default_mode: EvaluationMode,
}

impl ServerState {
    pub fn new(coordinator: RequestCoordinator, engine: EvaluationEngine) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            engine: Arc::new(engine),
            aggregator: Arc::new(ResponseAggregator::default()),
            ballots: Arc::new(BallotBox::default()),
            default_mode: EvaluationMode::default(),
        }
    }

    pub fn with_aggregator(mut self, aggregator: ResponseAggregator) -> Self {
        self.aggregator = Arc::new(aggregator);
        self
    }

    pub fn with_ballots(mut self, ballots: BallotBox) -> Self {
        self.ballots = Arc::new(ballots);
        self
    }

    pub fn with_default_mode(mut self, mode: EvaluationMode) -> Self {
        self.default_mode = mode;
        self
    }
}

/// Builds the router. An empty `cors_origins`, or one containing `*`,
/// allows any origin.
pub fn router(state: ServerState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/prompt", post(handlers::handle_prompt))
        .route("/evaluate", post(handlers::handle_evaluate))
        .route("/evaluate/ballot", post(handlers::handle_ballot))
        .route("/evaluate/vote", post(handlers::handle_vote))
        .route("/history", get(handlers::handle_history))
        .route("/models", get(handlers::handle_models))
        .route("/models/:id", get(handlers::handle_model))
        .route("/health", get(handlers::handle_health))
        .route("/ws/prompt", get(handlers::handle_ws_prompt))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("ignoring invalid CORS origin origin={origin} error={err}");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Serves `router` on `addr` until the process is stopped.
pub async fn serve(router: Router, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening addr={}", listener.local_addr()?);
    axum::serve(listener, router).await
}

#[cfg(test)]
#[path = "api/api_tests.rs"]
mod tests;
