// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Portolan: API documentation aggregator
//
//  Discovery:   gateway admin plane (routes + services)
//  Procurement: periodic upstream doc fetch into the fs store
//  Serving:     axum, per-caller filtered through the policy oracle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use anyhow::Context;
use clap::Parser;
use portolan_api::server::AppState;
use portolan_clients::{HttpDocProbe, KongClient, LadonClient};
use portolan_core::model::ServiceInfo;
use portolan_core::PortolanConfig;
use portolan_service::{AsyncapiService, Discovery, SwaggerService};
use portolan_store::FsStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "portolan", version, about = "Portolan, an API documentation aggregator")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/portolan/portolan.yaml")]
    config: PathBuf,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Config ──
    let config = if cli.config.exists() {
        PortolanConfig::load(cli.config.to_str()).context("loading config failed")?
    } else {
        PortolanConfig::load(None).context("loading config failed")?
    };

    // ── Tracing ──
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logger_level.clone());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if config.logger_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let srv_info = ServiceInfo {
        name: "portolan".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    info!(version = %srv_info.version, "Portolan starting");

    // ── Stores ──
    let swagger_store = Arc::new(FsStore::new(config.swagger_data_path(), "swagger"));
    swagger_store
        .init()
        .await
        .context("initializing swagger storage failed")?;
    let asyncapi_store = Arc::new(FsStore::new(config.asyncapi_data_path(), "asyncapi"));
    asyncapi_store
        .init()
        .await
        .context("initializing asyncapi storage failed")?;

    // ── Outbound clients ──
    let kong = Arc::new(KongClient::new(
        reqwest::Client::new(),
        config.kong_base_url.clone(),
        config.kong_user.clone(),
        config.kong_password.clone(),
    ));
    let probe = Arc::new(HttpDocProbe::new(
        reqwest::Client::new(),
        config.swagger_doc_path.clone(),
    ));
    let ladon = Arc::new(LadonClient::new(
        reqwest::Client::new(),
        config.ladon_base_url.clone(),
    ));

    // ── Services ──
    let discovery = Discovery::new(kong, config.timeout(), config.host_blacklist());
    let swagger = Arc::new(SwaggerService::new(
        Arc::clone(&swagger_store),
        discovery,
        probe,
        ladon,
        config.timeout(),
        config.api_gateway.clone(),
        config.admin_role_name.clone(),
    ));
    let asyncapi = Arc::new(AsyncapiService::new(asyncapi_store));

    let state = AppState {
        swagger: Arc::clone(&swagger),
        asyncapi,
        info: srv_info,
    };

    // ── Shutdown signal (SIGINT / SIGTERM) ──
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut sigint =
                signal(SignalKind::interrupt()).expect("installing SIGINT handler failed");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("installing SIGTERM handler failed");
            tokio::select! {
                _ = sigint.recv() => warn!("Caught SIGINT"),
                _ = sigterm.recv() => warn!("Caught SIGTERM"),
            }
            let _ = shutdown_tx.send(true);
        });
    }

    // ── Periodic procurement ──
    let mut procurement = tokio::spawn(
        Arc::clone(&swagger).run_periodic(config.interval(), shutdown_rx.clone()),
    );

    // ── HTTP server ──
    let mut server = tokio::spawn(portolan_api::serve(
        config.server_port,
        state,
        shutdown_rx,
    ));

    info!(
        port = config.server_port,
        interval_secs = config.procurement_interval,
        "Portolan is ready"
    );

    // Either task ending takes the whole process down; a failure exits
    // non-zero after the counterpart has drained.
    let mut failed = false;
    tokio::select! {
        outcome = &mut procurement => {
            if !matches!(outcome, Ok(Ok(()))) {
                error!("Periodic procurement failed");
                failed = true;
            }
            let _ = shutdown_tx.send(true);
            if !matches!(server.await, Ok(Ok(()))) {
                failed = true;
            }
        }
        outcome = &mut server => {
            if !matches!(outcome, Ok(Ok(()))) {
                error!("HTTP server failed");
                failed = true;
            }
            let _ = shutdown_tx.send(true);
            if !matches!(procurement.await, Ok(Ok(()))) {
                failed = true;
            }
        }
    }

    if failed {
        anyhow::bail!("shut down after failure");
    }
    info!("Portolan stopped");
    Ok(())
}
