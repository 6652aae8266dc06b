use crate::handlers;
use crate::middleware as mw;
use axum::middleware;
use axum::routing::{get, patch, put};
use axum::Router;
use portolan_core::model::ServiceInfo;
use portolan_service::{AsyncapiService, SwaggerService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// How long in-flight requests may drain after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub swagger: Arc<SwaggerService>,
    pub asyncapi: Arc<AsyncapiService>,
    pub info: ServiceInfo,
}

/// Build the public router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Docs
        .route("/docs/swagger", get(handlers::swagger::get_docs))
        .route("/docs/swagger/{id}", get(handlers::swagger::get_doc))
        .route("/docs/asyncapi", get(handlers::asyncapi::get_docs))
        .route("/docs/asyncapi/{id}", get(handlers::asyncapi::get_doc))
        // Storage
        .route("/storage/swagger", get(handlers::swagger::list_storage))
        .route("/storage/asyncapi", get(handlers::asyncapi::list_storage))
        .route(
            "/storage/asyncapi/{id}",
            put(handlers::asyncapi::put_doc).delete(handlers::asyncapi::delete_doc),
        )
        .route("/storage-refresh/swagger", patch(handlers::swagger::refresh))
        // Meta
        .route("/info", get(handlers::meta::info))
        .route("/health-check", get(handlers::meta::health_check))
        // Deprecated alias for /docs/swagger.
        .route("/swagger", get(handlers::swagger::get_docs))
        .layer(middleware::from_fn(mw::access_log))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mw::static_headers,
        ))
        .layer(middleware::from_fn(mw::request_id))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the public API until the shutdown signal fires, then drain for at
/// most [`SHUTDOWN_GRACE`].
pub async fn serve(
    port: u16,
    state: AppState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting HTTP server");

    let app = build_router(state);
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let mut shutdown = shutdown.clone();
        async move {
            let _ = shutdown.changed().await;
        }
    });

    let mut grace = shutdown.clone();
    tokio::select! {
        result = server => result?,
        _ = async {
            let _ = grace.changed().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!("Graceful shutdown timed out, dropping open connections");
        }
    }
    info!("HTTP server stopped");
    Ok(())
}
