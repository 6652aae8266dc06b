use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables recognized by [`PortolanConfig::load`]. The names are
/// deployment contracts; figment lowercases them onto the config fields.
const ENV_KEYS: &[&str] = &[
    "server_port",
    "workdir_path",
    "storage_swagger_data_path",
    "storage_asyncapi_data_path",
    "api_gateway",
    "kong_base_url",
    "kong_user",
    "kong_password",
    "discovery_host_blacklist",
    "swagger_doc_path",
    "procurement_interval",
    "http_timeout",
    "ladon_base_url",
    "admin_role_name",
    "logger_level",
    "logger_json",
];

/// Top-level configuration for Portolan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortolanConfig {
    /// HTTP listener port
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Data directory root; per-kind stores live in subdirectories
    #[serde(default = "default_workdir_path")]
    pub workdir_path: PathBuf,

    /// Override for the Swagger store directory
    #[serde(default)]
    pub storage_swagger_data_path: Option<PathBuf>,

    /// Override for the AsyncAPI store directory
    #[serde(default)]
    pub storage_asyncapi_data_path: Option<PathBuf>,

    /// Public gateway host substituted into every served document
    #[serde(default)]
    pub api_gateway: String,

    /// Gateway admin API base URL
    #[serde(default)]
    pub kong_base_url: String,

    /// Gateway admin basic-auth user (empty = no auth)
    #[serde(default)]
    pub kong_user: String,

    /// Gateway admin basic-auth password
    #[serde(default)]
    pub kong_password: Secret,

    /// Comma-separated upstream hosts excluded from discovery
    #[serde(default)]
    pub discovery_host_blacklist: String,

    /// Path appended to each upstream when probing for its document
    #[serde(default = "default_swagger_doc_path")]
    pub swagger_doc_path: String,

    /// Seconds between procurement cycles
    #[serde(default = "default_procurement_interval")]
    pub procurement_interval: u64,

    /// Per-operation timeout for outbound HTTP calls (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Policy oracle base URL
    #[serde(default)]
    pub ladon_base_url: String,

    /// Role that bypasses document filtering
    #[serde(default = "default_admin_role_name")]
    pub admin_role_name: String,

    /// Log level filter (overridden by RUST_LOG)
    #[serde(default = "default_logger_level")]
    pub logger_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub logger_json: bool,
}

impl PortolanConfig {
    /// Load configuration from an optional YAML file + environment variables.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::raw().only(ENV_KEYS));
        let config: Self = figment.extract()?;
        Ok(config)
    }

    /// Directory backing the Swagger store.
    pub fn swagger_data_path(&self) -> PathBuf {
        self.storage_swagger_data_path
            .clone()
            .unwrap_or_else(|| self.workdir_path.join("swagger"))
    }

    /// Directory backing the AsyncAPI store.
    pub fn asyncapi_data_path(&self) -> PathBuf {
        self.storage_asyncapi_data_path
            .clone()
            .unwrap_or_else(|| self.workdir_path.join("asyncapi"))
    }

    /// Blacklisted upstream hosts, split from the comma-separated contract form.
    pub fn host_blacklist(&self) -> Vec<String> {
        self.discovery_host_blacklist
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Per-operation outbound HTTP deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    /// Pause between procurement cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.procurement_interval)
    }
}

impl Default for PortolanConfig {
    fn default() -> Self {
        Self {
            server_port: default_server_port(),
            workdir_path: default_workdir_path(),
            storage_swagger_data_path: None,
            storage_asyncapi_data_path: None,
            api_gateway: String::new(),
            kong_base_url: String::new(),
            kong_user: String::new(),
            kong_password: Secret::default(),
            discovery_host_blacklist: String::new(),
            swagger_doc_path: default_swagger_doc_path(),
            procurement_interval: default_procurement_interval(),
            http_timeout: default_http_timeout(),
            ladon_base_url: String::new(),
            admin_role_name: default_admin_role_name(),
            logger_level: default_logger_level(),
            logger_json: false,
        }
    }
}

/// Opaque wrapper for secret strings. `Debug`/`Display` redact; only
/// [`Secret::value`] yields the plain text.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("*****")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("*****")
    }
}

// Serde default functions

fn default_server_port() -> u16 {
    8080
}

fn default_workdir_path() -> PathBuf {
    PathBuf::from("/opt/portolan/data")
}

fn default_swagger_doc_path() -> String {
    "/doc".to_string()
}

fn default_procurement_interval() -> u64 {
    300
}

fn default_http_timeout() -> u64 {
    15
}

fn default_admin_role_name() -> String {
    "admin".to_string()
}

fn default_logger_level() -> String {
    "info".to_string()
}
