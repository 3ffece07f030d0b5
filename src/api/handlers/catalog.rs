use axum::extract::{Path, Query, State};
use axum::Json;

use super::helpers::{gateway_error, lentra_error, not_found, ApiResult};
use crate::api::types::{HealthReply, HistoryQuery, HistoryReply, ModelsReply, DEFAULT_HISTORY_LIMIT};
use crate::api::ServerState;
use crate::gateway::ModelInfo;

pub async fn handle_history(
    State(state): State<ServerState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryReply>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let aggregator = &state.aggregator;
    Ok(Json(HistoryReply {
        exchanges: aggregator.recent(limit).map_err(lentra_error)?,
        total: aggregator.len().map_err(lentra_error)?,
        capacity: aggregator.capacity().map_err(lentra_error)?,
    }))
}

pub async fn handle_models(State(state): State<ServerState>) -> ApiResult<Json<ModelsReply>> {
    let models = state
        .coordinator
        .gateway()
        .list_models()
        .await
        .map_err(gateway_error)?;
    Ok(Json(ModelsReply { models }))
}

pub async fn handle_model(
    State(state): State<ServerState>,
    Path(model_id): Path<String>,
) -> ApiResult<Json<ModelInfo>> {
    state
        .coordinator
        .gateway()
        .model_info(&model_id)
        .await
        .map_err(gateway_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("Unknown model: {model_id}")))
}

pub async fn handle_health(State(state): State<ServerState>) -> ApiResult<Json<HealthReply>> {
    Ok(Json(HealthReply {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        history_len: state.aggregator.len().map_err(lentra_error)?,
        open_ballots: state.ballots.open_ballots(),
    }))
}
