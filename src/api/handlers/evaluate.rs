use axum::extract::State;
use axum::Json;
use uuid::Uuid;

use super::helpers::{evaluation_error, lentra_error, ApiResult};
use crate::api::types::{BallotBody, EvaluateBody, EvaluationReply, VoteBody};
use crate::api::ServerState;
use crate::evaluation::{BallotView, EvaluationResult};

pub async fn handle_evaluate(
    State(state): State<ServerState>,
    Json(body): Json<EvaluateBody>,
) -> ApiResult<Json<EvaluationReply>> {
    let (request, exchange_id) = body.into_request(state.default_mode);
    let result = state
        .engine
        .evaluate(&request)
        .await
        .map_err(evaluation_error)?;
    if let Some(exchange_id) = exchange_id {
        attach(&state, exchange_id, &result)?;
    }
    Ok(Json(result.into()))
}

pub async fn handle_ballot(
    State(state): State<ServerState>,
    Json(body): Json<BallotBody>,
) -> ApiResult<Json<BallotView>> {
    let (prompt, responses) = body.into_parts();
    state
        .ballots
        .create_ballot(&prompt, &responses)
        .map(Json)
        .map_err(evaluation_error)
}

pub async fn handle_vote(
    State(state): State<ServerState>,
    Json(body): Json<VoteBody>,
) -> ApiResult<Json<EvaluationReply>> {
    let result = state
        .ballots
        .record_vote(body.ballot_id, body.option, body.reasoning)
        .map_err(evaluation_error)?;
    if let Some(exchange_id) = body.exchange_id {
        attach(&state, exchange_id, &result)?;
    }
    Ok(Json(result.into()))
}

fn attach(state: &ServerState, exchange_id: Uuid, result: &EvaluationResult) -> ApiResult<()> {
    let attached = state
        .aggregator
        .attach_evaluation(exchange_id, result.clone())
        .map_err(lentra_error)?;
    if !attached {
        log::warn!("evaluation not attached, exchange not in history exchange_id={exchange_id}");
    }
    Ok(())
}
