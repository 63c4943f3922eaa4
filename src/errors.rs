use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("callback returned status {status}")]
    DispatchFailed { status: u16 },

    #[error("callback unreachable: {0}")]
    Transport(String),

    /// Random id generation kept colliding with live ids.
    #[error("could not generate a unique identifier")]
    IdSpaceExhausted,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                reason.clone(),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "not_found",
                format!("{} not found", what),
            ),
            AppError::AlreadyExists(what) => (
                StatusCode::CONFLICT,
                "conflict_error",
                "already_exists",
                format!("{} already exists", what),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_token",
                "invalid or missing token".to_string(),
            ),
            AppError::DispatchFailed { status } => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "callback_rejected",
                format!("callback returned status {}", status),
            ),
            AppError::Transport(e) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "callback_unreachable",
                e.clone(),
            ),
            AppError::IdSpaceExhausted => {
                tracing::error!("request id generation exhausted its attempt budget");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::Validation("name is required".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("application 'acme'".into()), StatusCode::NOT_FOUND),
            (AppError::AlreadyExists("application 'acme'".into()), StatusCode::CONFLICT),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::DispatchFailed { status: 500 }, StatusCode::BAD_GATEWAY),
            (AppError::IdSpaceExhausted, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_storage_error_body_is_generic() {
        let resp = AppError::Storage(anyhow::anyhow!("disk on fire at /var/secret")).into_response();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "internal_server_error");
        assert!(!body.to_string().contains("/var/secret"));
    }
}
