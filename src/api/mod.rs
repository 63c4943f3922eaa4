use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::redact::mask_secret;
use crate::AppState;

pub mod handlers;

/// Build the management API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/apps",
            get(handlers::list_apps).post(handlers::register_app),
        )
        .route(
            "/apps/:name",
            get(handlers::get_app)
                .put(handlers::update_app)
                .delete(handlers::unregister_app),
        )
        .route(
            "/messages",
            get(handlers::list_messages).post(handlers::create_message),
        )
        .route(
            "/messages/:id",
            get(handlers::get_message).delete(handlers::delete_message),
        )
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

/// Full service: health probe plus the management API.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(api_router())
        .with_state(state)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Token from `Authorization: <token>` or `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let raw = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match raw {
        Some(v) => {
            let token = v.strip_prefix("Bearer ").unwrap_or(v).trim();
            if token.is_empty() {
                tracing::warn!("management API: empty bearer token");
                return Err(AppError::Unauthorized);
            }
            tracing::debug!(token = mask_secret(token), "management API: bearer token presented");
            Ok(token.to_string())
        }
        None => {
            tracing::warn!("management API: missing Authorization header");
            Err(AppError::Unauthorized)
        }
    }
}
