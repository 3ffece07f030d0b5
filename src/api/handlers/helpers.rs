use axum::http::StatusCode;

use crate::error::{GatewayError, LentraError};
use crate::evaluation::EvaluationError;

pub type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn not_found(msg: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, msg.into())
}

pub fn lentra_error(err: LentraError) -> (StatusCode, String) {
    let status = match &err {
        LentraError::Validation(_) => StatusCode::BAD_REQUEST,
        LentraError::Retrieval(_) => StatusCode::SERVICE_UNAVAILABLE,
        LentraError::Evaluation(inner) => evaluation_status(inner),
        LentraError::Gateway(inner) => gateway_status(inner),
        LentraError::Aggregation(_) | LentraError::Stream(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        log::error!("request failed status={status} error={err}");
    }
    (status, err.to_string())
}

pub fn evaluation_error(err: EvaluationError) -> (StatusCode, String) {
    lentra_error(LentraError::Evaluation(err))
}

pub fn gateway_error(err: GatewayError) -> (StatusCode, String) {
    lentra_error(LentraError::Gateway(err))
}

fn evaluation_status(err: &EvaluationError) -> StatusCode {
    match err {
        EvaluationError::NoResponses => StatusCode::UNPROCESSABLE_ENTITY,
        EvaluationError::BallotNotFound(_) => StatusCode::NOT_FOUND,
        EvaluationError::Embedding(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::UnknownModel(_) => StatusCode::NOT_FOUND,
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}
