use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use portolan_core::model::ServiceInfo;

/// GET /info
pub async fn info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(state.info.clone())
}

/// GET /health-check. Healthy when both stores respond.
pub async fn health_check(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.swagger.health_check().await?;
    state.asyncapi.health_check().await?;
    Ok(StatusCode::OK)
}
