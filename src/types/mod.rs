//! Shared types and error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::codec::DecodeError;
use crate::query::QueryError;

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The ledger rejected or aborted the view call.
    #[error("Simulation failed: {message}")]
    Simulation { code: Option<u64>, message: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound(what) => ApiError::NotFound(what),
            QueryError::InvalidInput(msg) => ApiError::BadRequest(msg),
            QueryError::Simulation { code, message } => ApiError::Simulation { code, message },
            QueryError::Transport(msg) => ApiError::Upstream(msg),
            QueryError::Decode(e) => ApiError::Internal(decode_message(&e)),
        }
    }
}

fn decode_message(err: &DecodeError) -> String {
    format!("failed to decode view call result: {}", err)
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    abort_code: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Simulation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "SIMULATION_FAILED"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let abort_code = match &self {
            ApiError::Simulation { code, .. } => *code,
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            abort_code,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_status_codes() {
        let cases = [
            (QueryError::NotFound("pool 'X'".into()), StatusCode::NOT_FOUND),
            (QueryError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                QueryError::simulation("MoveAbort(MoveLocation { function: 1 }, 3) in command 0"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (QueryError::Transport("timeout".into()), StatusCode::BAD_GATEWAY),
            (
                QueryError::Decode(DecodeError::InvalidBool(2)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_abort_code_is_carried() {
        let err = ApiError::from(QueryError::simulation(
            "MoveAbort(MoveLocation { function: 1 }, 3) in command 0",
        ));
        assert!(matches!(err, ApiError::Simulation { code: Some(3), .. }));
    }
}
