use axum::extract::State;
use axum::Json;

use super::helpers::{lentra_error, ApiResult};
use crate::api::types::{PromptBody, PromptReply};
use crate::api::ServerState;
use crate::prompt::PromptRequest;

/// Fans the prompt out and records the exchange. Partial backend failure
/// still answers 200, with the failed models tagged in `responses`.
pub async fn handle_prompt(
    State(state): State<ServerState>,
    Json(body): Json<PromptBody>,
) -> ApiResult<Json<PromptReply>> {
    let request = PromptRequest::from(body);
    let outcome = state
        .coordinator
        .dispatch(&request)
        .await
        .map_err(lentra_error)?;
    let exchange = state
        .aggregator
        .aggregate_outcome(&request, &outcome)
        .map_err(lentra_error)?;
    Ok(Json(PromptReply::new(&exchange, outcome)))
}
