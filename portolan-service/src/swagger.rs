use crate::discovery::Discovery;
use crate::filter::filter_doc;
use crate::transform::{transform_doc, Doc};
use crate::with_timeout;
use portolan_clients::policy::PolicyOracle;
use portolan_clients::probe::DocProbe;
use portolan_core::model::{arg_key, Args, StorageData, SwaggerItem};
use portolan_core::PortolanError;
use portolan_store::FsStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::error;

/// Swagger/OpenAPI façade: procured documents, curated per caller.
pub struct SwaggerService {
    pub(crate) store: Arc<FsStore>,
    pub(crate) discovery: Discovery,
    pub(crate) probe: Arc<dyn DocProbe>,
    pub(crate) oracle: Arc<dyn PolicyOracle>,
    pub(crate) timeout: Duration,
    pub(crate) gateway_host: String,
    pub(crate) admin_role_name: String,
    /// Single-flight guard: one procurement cycle per process.
    pub(crate) refresh_lock: Mutex<()>,
}

impl SwaggerService {
    pub fn new(
        store: Arc<FsStore>,
        discovery: Discovery,
        probe: Arc<dyn DocProbe>,
        oracle: Arc<dyn PolicyOracle>,
        timeout: Duration,
        gateway_host: impl Into<String>,
        admin_role_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            discovery,
            probe,
            oracle,
            timeout,
            gateway_host: gateway_host.into(),
            admin_role_name: admin_role_name.into(),
            refresh_lock: Mutex::new(()),
        }
    }

    fn is_admin(&self, user_roles: &[String]) -> bool {
        user_roles.iter().any(|role| role == &self.admin_role_name)
    }

    /// All stored documents the caller may see, transformed to the gateway
    /// view and sorted by base path. Callers with neither a token nor roles
    /// get an empty list without touching the store.
    pub async fn get_docs(
        &self,
        user_token: &str,
        user_roles: &[String],
    ) -> Result<Vec<Doc>, PortolanError> {
        if user_token.is_empty() && user_roles.is_empty() {
            return Ok(Vec::new());
        }
        let data = self.store.list().await;
        let is_admin = self.is_admin(user_roles);

        let mut tasks = JoinSet::new();
        for item in data {
            let store = Arc::clone(&self.store);
            let oracle = Arc::clone(&self.oracle);
            let timeout = self.timeout;
            let gateway_host = self.gateway_host.clone();
            let token = user_token.to_string();
            let roles = user_roles.to_vec();
            tasks.spawn(async move {
                render_item(store, oracle, timeout, gateway_host, token, roles, is_admin, item)
                    .await
            });
        }

        let mut wrapped: Vec<(String, Doc)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(mut docs) => wrapped.append(&mut docs),
                Err(e) => error!(error = %e, "Doc render task failed"),
            }
        }
        wrapped.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(wrapped.into_iter().map(|(_, doc)| doc).collect())
    }

    /// One stored document by id. A document the filter empties is withheld
    /// as `Forbidden`.
    pub async fn get_doc(
        &self,
        id: &str,
        user_token: &str,
        user_roles: &[String],
    ) -> Result<Vec<u8>, PortolanError> {
        let raw = self.store.read(id).await?;
        let item = self
            .store
            .list()
            .await
            .into_iter()
            .find(|data| data.id == id)
            .ok_or_else(|| PortolanError::NotFound(id.to_string()))?;
        let base_path = base_paths(&item.args).into_iter().next().unwrap_or_default();

        let mut doc = transform_doc(&raw, &self.gateway_host, &base_path)?;
        if !self.is_admin(user_roles) {
            let kept = filter_doc(
                self.oracle.as_ref(),
                self.timeout,
                &mut doc,
                user_token,
                user_roles,
                &base_path,
            )
            .await?;
            if !kept {
                return Err(PortolanError::Forbidden(
                    "no accessible operations".to_string(),
                ));
            }
        }
        Ok(serde_json::to_vec(&doc)?)
    }

    /// Stored metadata, restricted for non-admins to entries with at least
    /// one operation the caller may invoke.
    pub async fn list_storage(
        &self,
        user_token: &str,
        user_roles: &[String],
    ) -> Result<Vec<SwaggerItem>, PortolanError> {
        let data = self.store.list().await;
        let is_admin = self.is_admin(user_roles);

        let mut items = Vec::new();
        for entry in data {
            if !is_admin && !self.check_routes(&entry, user_token, user_roles).await? {
                continue;
            }
            items.push(swagger_item(&entry));
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    /// At least one of the entry's stored operations is allowed for the caller.
    async fn check_routes(
        &self,
        data: &StorageData,
        user_token: &str,
        user_roles: &[String],
    ) -> Result<bool, PortolanError> {
        let mut path_methods: HashMap<String, Vec<String>> = HashMap::new();
        for route in data.args.all(arg_key::ROUTE) {
            if let Some((path, method)) = route.rsplit_once('|') {
                path_methods
                    .entry(path.to_string())
                    .or_default()
                    .push(method.to_string());
            }
        }
        if path_methods.is_empty() {
            return Ok(false);
        }

        if !user_token.is_empty() {
            let access = with_timeout(
                self.timeout,
                self.oracle.get_user_access_policy(user_token, &path_methods),
            )
            .await?;
            return Ok(access.values().any(|methods| !methods.is_empty()));
        }
        for (path, methods) in &path_methods {
            for method in methods {
                for role in user_roles {
                    let allowed = with_timeout(
                        self.timeout,
                        self.oracle.get_role_access_policy(role, path, method),
                    )
                    .await?;
                    if allowed {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Healthy when the storage listing path responds.
    pub async fn health_check(&self) -> Result<(), PortolanError> {
        self.store.health_check().await
    }
}

/// Read one stored entry and render a transformed (and, unless the caller is
/// an admin, filtered) document per mount. Failures are logged and the entry
/// is skipped so one bad document never empties the whole listing.
#[allow(clippy::too_many_arguments)]
async fn render_item(
    store: Arc<FsStore>,
    oracle: Arc<dyn PolicyOracle>,
    timeout: Duration,
    gateway_host: String,
    user_token: String,
    user_roles: Vec<String>,
    is_admin: bool,
    item: StorageData,
) -> Vec<(String, Doc)> {
    let raw = match store.read(&item.id).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(id = %item.id, error = %e, "Reading doc failed");
            return Vec::new();
        }
    };

    let mut rendered = Vec::new();
    for base_path in base_paths(&item.args) {
        let mut doc = match transform_doc(&raw, &gateway_host, &base_path) {
            Ok(doc) => doc,
            Err(e) => {
                error!(base_path = %base_path, error = %e, "Transforming doc failed");
                continue;
            }
        };
        if !is_admin {
            match filter_doc(
                oracle.as_ref(),
                timeout,
                &mut doc,
                &user_token,
                &user_roles,
                &base_path,
            )
            .await
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!(base_path = %base_path, error = %e, "Filtering doc failed");
                    continue;
                }
            }
        }
        rendered.push((base_path, doc));
    }
    rendered
}

/// Mounts a stored entry serves: its `ext-path` list, or the single
/// `base-path` written by per-mount procurement.
fn base_paths(args: &Args) -> Vec<String> {
    let ext_paths: Vec<String> = args.all(arg_key::EXT_PATH).map(str::to_string).collect();
    if !ext_paths.is_empty() {
        return ext_paths;
    }
    args.first(arg_key::BASE_PATH)
        .map(str::to_string)
        .into_iter()
        .collect()
}

fn swagger_item(data: &StorageData) -> SwaggerItem {
    SwaggerItem {
        id: data.id.clone(),
        title: data.args.first(arg_key::TITLE).unwrap_or_default().to_string(),
        version: data.args.first(arg_key::VERSION).unwrap_or_default().to_string(),
        description: data
            .args
            .first(arg_key::DESCRIPTION)
            .unwrap_or_default()
            .to_string(),
        base_path: base_paths(&data.args).into_iter().next().unwrap_or_default(),
    }
}
