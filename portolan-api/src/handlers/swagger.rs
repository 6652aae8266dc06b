use crate::error::ApiError;
use crate::middleware::Identity;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use portolan_core::model::SwaggerItem;
use portolan_service::transform::Doc;

/// GET /docs/swagger
pub async fn get_docs(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<Doc>>, ApiError> {
    let docs = state
        .swagger
        .get_docs(&identity.token, &identity.roles)
        .await?;
    Ok(Json(docs))
}

/// GET /docs/swagger/{id}
pub async fn get_doc(
    State(state): State<AppState>,
    Path(id): Path<String>,
    identity: Identity,
) -> Result<Response, ApiError> {
    let body = state
        .swagger
        .get_doc(&id, &identity.token, &identity.roles)
        .await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// GET /storage/swagger
pub async fn list_storage(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<SwaggerItem>>, ApiError> {
    let items = state
        .swagger
        .list_storage(&identity.token, &identity.roles)
        .await?;
    Ok(Json(items))
}

/// PATCH /storage-refresh/swagger
pub async fn refresh(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.swagger.refresh_docs().await?;
    Ok(StatusCode::OK)
}
