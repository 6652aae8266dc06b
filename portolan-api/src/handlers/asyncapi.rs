use crate::error::ApiError;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use portolan_core::model::AsyncapiItem;
use serde_json::Value;

/// GET /docs/asyncapi
pub async fn get_docs(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    let docs = state.asyncapi.get_docs().await?;
    Ok(Json(docs))
}

/// GET /docs/asyncapi/{id}
pub async fn get_doc(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let body = state.asyncapi.get_doc(&id).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// GET /storage/asyncapi
pub async fn list_storage(
    State(state): State<AppState>,
) -> Result<Json<Vec<AsyncapiItem>>, ApiError> {
    let items = state.asyncapi.list_storage().await?;
    Ok(Json(items))
}

/// PUT /storage/asyncapi/{id}
pub async fn put_doc(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.asyncapi.put_doc(&id, &body).await?;
    Ok(StatusCode::OK)
}

/// DELETE /storage/asyncapi/{id}
pub async fn delete_doc(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.asyncapi.delete_doc(&id).await?;
    Ok(StatusCode::OK)
}
