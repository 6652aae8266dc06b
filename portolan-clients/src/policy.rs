use async_trait::async_trait;
use portolan_core::PortolanError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The authorization oracle consulted when filtering documents.
///
/// Two decision modes: per-role single decisions and per-token batched
/// decisions over a whole document's operations.
#[async_trait]
pub trait PolicyOracle: Send + Sync {
    /// Is `role` allowed to call `method` on `path`?
    async fn get_role_access_policy(
        &self,
        role: &str,
        path: &str,
        method: &str,
    ) -> Result<bool, PortolanError>;

    /// Which of the given `path → methods` operations may the token holder
    /// call? The result groups allowed methods under the original path
    /// spelling of the input.
    async fn get_user_access_policy(
        &self,
        token: &str,
        path_methods: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>, PortolanError>;
}

#[derive(Debug, Serialize)]
struct RoleAccessRequest {
    resource: String,
    action: String,
    subject: String,
}

#[derive(Debug, Deserialize)]
struct RoleAccessResponse {
    #[serde(default)]
    result: bool,
}

#[derive(Debug, Serialize)]
struct UserAccessEntry {
    method: String,
    endpoint: String,
    #[serde(skip)]
    org_method: String,
    #[serde(skip)]
    org_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct UserAccessResponse {
    #[serde(default)]
    allowed: Vec<bool>,
}

/// Ladon policy service client.
pub struct LadonClient {
    client: reqwest::Client,
    base_url: String,
}

impl LadonClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PolicyOracle for LadonClient {
    async fn get_role_access_policy(
        &self,
        role: &str,
        path: &str,
        method: &str,
    ) -> Result<bool, PortolanError> {
        let body = RoleAccessRequest {
            resource: format!("endpoints{}", path.replace('/', ":")),
            action: method.to_uppercase(),
            subject: role.to_string(),
        };
        let resp = self
            .client
            .get(self.url("access"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let decision: RoleAccessResponse = resp.json().await?;
        Ok(decision.result)
    }

    async fn get_user_access_policy(
        &self,
        token: &str,
        path_methods: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>, PortolanError> {
        let entries = flatten_request(path_methods);
        let resp = self
            .client
            .post(self.url("allowed"))
            .header("Authorization", token)
            .json(&entries)
            .send()
            .await?
            .error_for_status()?;
        let decisions: UserAccessResponse = resp.json().await?;
        group_response(&entries, &decisions.allowed)
    }
}

/// Flatten `path → methods` into one entry per operation, sorted ascending by
/// `(normalized endpoint + method)` so the batch order is deterministic. The
/// normalized endpoint always begins with `/`; the original spelling is kept
/// for regrouping the response.
fn flatten_request(path_methods: &HashMap<String, Vec<String>>) -> Vec<UserAccessEntry> {
    let mut entries: Vec<UserAccessEntry> = Vec::new();
    for (path, methods) in path_methods {
        let endpoint = if path.starts_with('/') {
            path.clone()
        } else {
            format!("/{path}")
        };
        for method in methods {
            entries.push(UserAccessEntry {
                method: method.to_uppercase(),
                endpoint: endpoint.clone(),
                org_method: method.clone(),
                org_endpoint: path.clone(),
            });
        }
    }
    entries.sort_by(|a, b| {
        format!("{}{}", a.endpoint, a.method).cmp(&format!("{}{}", b.endpoint, b.method))
    });
    entries
}

/// Regroup a parallel `[bool]` response under the original path spellings.
/// A length mismatch between request and response is a hard error.
fn group_response(
    entries: &[UserAccessEntry],
    allowed: &[bool],
) -> Result<HashMap<String, Vec<String>>, PortolanError> {
    if entries.len() != allowed.len() {
        return Err(PortolanError::Internal("bad response".to_string()));
    }
    let mut result: HashMap<String, Vec<String>> = HashMap::new();
    for (entry, ok) in entries.iter().zip(allowed) {
        let methods = result.entry(entry.org_endpoint.clone()).or_default();
        if *ok {
            methods.push(entry.org_method.clone());
        }
    }
    Ok(result)
}
