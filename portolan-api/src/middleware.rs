use crate::server::AppState;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::convert::Infallible;
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const HEADER_API_VERSION: HeaderName = HeaderName::from_static("x-api-version");
pub const HEADER_SERVICE_NAME: HeaderName = HeaderName::from_static("x-service-name");
pub const HEADER_USER_ROLES: HeaderName = HeaderName::from_static("x-user-roles");

/// Paths excluded from access logging.
const UNLOGGED_PATHS: &[&str] = &["/health-check"];

/// Per-request identifier, propagated from `X-Request-ID` or generated.
/// Available to handlers as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Caller identity forwarded by the gateway: the raw `Authorization` value
/// and the comma-space separated `X-User-Roles` list. The service trusts
/// these headers; authenticating them is the gateway's job.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub token: String,
    pub roles: Vec<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let roles = parts
            .headers
            .get(&HEADER_USER_ROLES)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .split(", ")
                    .filter(|role| !role.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Identity { token, roles })
    }
}

/// Propagate or generate the request ID, open a span carrying it, and copy it
/// onto the response. Everything downstream logs inside the span, so the ID
/// is never threaded as a parameter.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&HEADER_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let span = info_span!("request", request_id = %id);
    let mut resp = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(HEADER_REQUEST_ID, value);
    }
    resp
}

/// Stamp the service identity headers onto every response.
pub async fn static_headers(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&state.info.version) {
        resp.headers_mut().insert(HEADER_API_VERSION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&state.info.name) {
        resp.headers_mut().insert(HEADER_SERVICE_NAME, value);
    }
    resp
}

/// One structured log line per handled request, skipping the health probe.
pub async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    if UNLOGGED_PATHS.contains(&path.as_str()) {
        return next.run(req).await;
    }
    let start = Instant::now();
    let resp = next.run(req).await;
    info!(
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Request handled"
    );
    resp
}
