use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::bearer_token;
use crate::errors::AppError;
use crate::models::application::{
    ApplicationPatch, ApplicationView, NewApplication, RegisteredApplication,
};
use crate::models::request::{CreatedRequest, NewRequest, RequestView};
use crate::AppState;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::Validation(format!("could not decode json body: {}", e.body_text())))
}

// ── Applications ─────────────────────────────────────────────

/// GET /apps: every application, tokens omitted
pub async fn list_apps(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, ApplicationView>> {
    Json(state.registry.list_apps().await)
}

/// POST /apps: register; the response is the only time the token is shown
pub async fn register_app(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewApplication>, JsonRejection>,
) -> Result<Json<RegisteredApplication>, AppError> {
    let app = state.registry.register_app(body(payload)?).await?;
    Ok(Json(RegisteredApplication {
        application: app.view(),
        token: app.token,
    }))
}

/// GET /apps/:name
pub async fn get_app(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApplicationView>, AppError> {
    Ok(Json(state.registry.get_app(&name).await?.view()))
}

/// PUT /apps/:name: token holder only
pub async fn update_app(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ApplicationPatch>, JsonRejection>,
) -> Result<Json<ApplicationView>, AppError> {
    let token = bearer_token(&headers)?;
    let patch = body(payload)?;
    let app = state.registry.update_app(&name, &token, patch).await?;
    Ok(Json(app.view()))
}

/// DELETE /apps/:name: token holder only; pending requests are kept
pub async fn unregister_app(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = bearer_token(&headers)?;
    state.registry.unregister_app(&name, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Requests ─────────────────────────────────────────────────

/// GET /messages: every live request, auth tokens omitted
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, RequestView>> {
    Json(state.registry.list_requests().await)
}

/// POST /messages: start tracking a message
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedRequest>), AppError> {
    let request = state.registry.create_request(body(payload)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedRequest {
            message_id: request.id,
        }),
    ))
}

/// GET /messages/:id
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, AppError> {
    Ok(Json(state.registry.get_request(&id).await?.view()))
}

/// DELETE /messages/:id: stop tracking; needs the request's auth token
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    // Unknown ids are 404 even without credentials.
    state.registry.get_request(&id).await?;
    let token = bearer_token(&headers)?;
    state.registry.delete_request_authorized(&id, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}
