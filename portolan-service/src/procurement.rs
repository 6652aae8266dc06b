//! Periodic and on-demand procurement: fetch every discovered upstream's
//! document, normalize it per gateway mount, persist it, and drop stored
//! entries whose upstream disappeared.

use crate::swagger::SwaggerService;
use crate::transform::{
    apply_gateway_view, doc_info, enumerate_routes, parse_doc, validate_swagger_doc,
};
use crate::with_timeout;
use portolan_clients::probe::DocProbe;
use portolan_core::model::{arg_key, Args, DiscoveredService};
use portolan_core::PortolanError;
use portolan_store::FsStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Delay before the first cycle after startup.
const STARTUP_DELAY: Duration = Duration::from_millis(1);

/// Storage identity of one `(service, mount)` pair.
pub fn storage_id(service_id: &str, ext_path: &str) -> String {
    format!("{}{}", service_id, ext_path.replace('/', "_"))
}

impl SwaggerService {
    /// One full procurement cycle. Only one cycle runs at a time across the
    /// process; a concurrent call fails fast with `ResourceBusy`.
    pub async fn refresh_docs(&self) -> Result<(), PortolanError> {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            return Err(PortolanError::ResourceBusy(
                "procurement running".to_string(),
            ));
        };

        let services = self.discovery.discover().await?;

        let mut tasks = JoinSet::new();
        for service in services.values() {
            if service.ext_paths.is_empty() {
                continue;
            }
            tasks.spawn(procure_service(
                Arc::clone(&self.store),
                Arc::clone(&self.probe),
                self.timeout,
                self.gateway_host.clone(),
                service.clone(),
            ));
        }
        while tasks.join_next().await.is_some() {}

        if let Err(e) = self.clean_stale_entries(&services).await {
            error!(error = %e, "Removing stale docs failed");
        }
        Ok(())
    }

    /// Delete stored entries no discovered `(service, mount)` pair accounts for.
    async fn clean_stale_entries(
        &self,
        services: &HashMap<String, DiscoveredService>,
    ) -> Result<(), PortolanError> {
        let live_ids: HashSet<String> = services
            .values()
            .flat_map(|service| {
                service
                    .ext_paths
                    .iter()
                    .map(|ext_path| storage_id(&service.id, ext_path))
            })
            .collect();
        for stored in self.store.list().await {
            if !live_ids.contains(&stored.id) {
                if let Err(e) = self.store.delete(&stored.id).await {
                    error!(id = %stored.id, error = %e, "Removing stale doc failed");
                }
            }
        }
        Ok(())
    }

    /// Procurement loop: first cycle almost immediately, then one per
    /// `interval`. `ResourceBusy` outcomes are expected overlap and stay
    /// silent; other failures are logged and retried next tick. A panicking
    /// cycle is caught at the task join, logged, and ends the loop with an
    /// error so the orchestrator can shut the process down.
    pub async fn run_periodic(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), PortolanError> {
        info!("Starting periodic procurement");
        let mut delay = STARTUP_DELAY;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let service = Arc::clone(&self);
                    let cycle = tokio::spawn(async move { service.refresh_docs().await });
                    match cycle.await {
                        Ok(Ok(())) => {}
                        Ok(Err(PortolanError::ResourceBusy(_))) => {}
                        Ok(Err(e)) => error!(error = %e, "Procurement failed"),
                        Err(join_err) if join_err.is_panic() => {
                            error!(error = %join_err, "Procurement panicked");
                            return Err(PortolanError::Internal(format!(
                                "procurement panicked: {join_err}"
                            )));
                        }
                        Err(join_err) => error!(error = %join_err, "Procurement task failed"),
                    }
                    delay = interval;
                }
                _ = shutdown.changed() => {
                    info!("Stopping periodic procurement");
                    return Ok(());
                }
            }
        }
    }
}

/// Fetch, validate, and persist one upstream's document, once per mount.
/// Any failure is logged and the upstream is skipped until the next cycle;
/// its previous revisions stay untouched.
async fn procure_service(
    store: Arc<FsStore>,
    probe: Arc<dyn DocProbe>,
    timeout: Duration,
    gateway_host: String,
    service: DiscoveredService,
) {
    debug!(host = %service.host, port = service.port, "Probing upstream");
    let raw = match with_timeout(
        timeout,
        probe.get_doc(&service.protocol, &service.host, service.port),
    )
    .await
    {
        Ok(raw) => raw,
        Err(e) => {
            debug!(host = %service.host, port = service.port, error = %e, "Probing upstream failed");
            return;
        }
    };

    let doc = match parse_doc(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(host = %service.host, port = service.port, error = %e, "Decoding doc failed");
            return;
        }
    };
    if let Err(e) = validate_swagger_doc(&doc) {
        warn!(host = %service.host, port = service.port, error = %e, "Validating doc failed");
        return;
    }
    let info = doc_info(&doc);

    for ext_path in &service.ext_paths {
        let mut mounted = doc.clone();
        apply_gateway_view(&mut mounted, &gateway_host, ext_path);

        let mut args = Args::new();
        args.push(arg_key::TITLE, info.title.clone());
        args.push(arg_key::VERSION, info.version.clone());
        args.push(arg_key::DESCRIPTION, info.description.clone());
        args.push(arg_key::BASE_PATH, ext_path.clone());
        for route in enumerate_routes(&mounted, ext_path) {
            args.push(arg_key::ROUTE, route);
        }

        let body = match serde_json::to_vec(&mounted) {
            Ok(body) => body,
            Err(e) => {
                error!(host = %service.host, base_path = %ext_path, error = %e, "Encoding doc failed");
                continue;
            }
        };
        let id = storage_id(&service.id, ext_path);
        if let Err(e) = store.write(&id, args, &body).await {
            error!(id = %id, error = %e, "Writing doc failed");
        }
    }
}
