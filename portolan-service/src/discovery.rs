use crate::with_timeout;
use portolan_clients::gateway::GatewayAdmin;
use portolan_core::model::DiscoveredService;
use portolan_core::PortolanError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Joins the gateway's routes and services into a deduplicated inventory of
/// reachable upstreams keyed by `"{host}{port}"`.
pub struct Discovery {
    gateway: Arc<dyn GatewayAdmin>,
    timeout: Duration,
    host_blacklist: HashSet<String>,
}

impl Discovery {
    pub fn new(gateway: Arc<dyn GatewayAdmin>, timeout: Duration, host_blacklist: Vec<String>) -> Self {
        Self {
            gateway,
            timeout,
            host_blacklist: host_blacklist.into_iter().collect(),
        }
    }

    /// One discovery pass against the gateway admin plane.
    ///
    /// Routes without paths or without a resolvable service are skipped, as
    /// are blacklisted hosts. `ext_paths` keeps route iteration order and is
    /// not deduplicated.
    pub async fn discover(&self) -> Result<HashMap<String, DiscoveredService>, PortolanError> {
        let routes = with_timeout(self.timeout, self.gateway.get_routes()).await?;
        let services = with_timeout(self.timeout, self.gateway.get_services()).await?;

        let service_by_id: HashMap<&str, &portolan_clients::gateway::GatewayService> =
            services.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut inventory: HashMap<String, DiscoveredService> = HashMap::new();
        for route in &routes {
            let paths = route.paths.as_deref().unwrap_or_default();
            if paths.is_empty() {
                continue;
            }
            let Some(service_ref) = &route.service else {
                continue;
            };
            let Some(service) = service_by_id.get(service_ref.id.as_str()) else {
                continue;
            };
            if self.host_blacklist.contains(&service.host) {
                continue;
            }
            let id = format!("{}{}", service.host, service.port);
            let entry = inventory
                .entry(id.clone())
                .or_insert_with(|| DiscoveredService {
                    id,
                    host: service.host.clone(),
                    port: service.port,
                    protocol: service.protocol.clone(),
                    ext_paths: Vec::new(),
                });
            entry.ext_paths.extend(paths.iter().cloned());
        }

        for service in inventory.values() {
            debug!(
                host = %service.host,
                port = service.port,
                ext_paths = ?service.ext_paths,
                "Discovered upstream"
            );
        }
        Ok(inventory)
    }
}
