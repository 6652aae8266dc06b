use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use portolan_core::PortolanError;
use tracing::error;

/// Response wrapper carrying the service error taxonomy into HTTP.
pub struct ApiError(pub PortolanError);

impl<E: Into<PortolanError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            self.0.to_json_body(),
        )
            .into_response()
    }
}
