use async_trait::async_trait;
use portolan_core::config::Secret;
use portolan_core::PortolanError;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Read access to the gateway's admin plane.
#[async_trait]
pub trait GatewayAdmin: Send + Sync {
    async fn get_routes(&self) -> Result<Vec<GatewayRoute>, PortolanError>;
    async fn get_services(&self) -> Result<Vec<GatewayService>, PortolanError>;
}

/// Gateway route, reduced to the fields discovery consumes. Unknown keys are
/// ignored; `paths` and `service` may be null on serviceless routes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayRoute {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub paths: Option<Vec<String>>,
    #[serde(default)]
    pub service: Option<RouteService>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteService {
    #[serde(default)]
    pub id: String,
}

/// Gateway upstream service, reduced to the fields discovery consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayService {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub protocol: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct DataEnvelope<T> {
    #[serde(default)]
    data: Vec<T>,
}

/// Kong admin API client.
pub struct KongClient {
    client: reqwest::Client,
    base_url: String,
    user: String,
    password: Secret,
}

impl KongClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: Secret,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            user: user.into(),
            password,
        }
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, PortolanError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self.client.get(&url);
        if !self.user.is_empty() {
            req = req.basic_auth(&self.user, Some(self.password.value()));
        }
        let resp = req.send().await?.error_for_status()?;
        let envelope: DataEnvelope<T> = resp.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl GatewayAdmin for KongClient {
    async fn get_routes(&self) -> Result<Vec<GatewayRoute>, PortolanError> {
        self.get_list("routes").await
    }

    async fn get_services(&self) -> Result<Vec<GatewayService>, PortolanError> {
        self.get_list("services").await
    }
}
