use async_trait::async_trait;
use portolan_core::PortolanError;

/// Fetches the self-published API document from one upstream.
#[async_trait]
pub trait DocProbe: Send + Sync {
    async fn get_doc(
        &self,
        protocol: &str,
        host: &str,
        port: u16,
    ) -> Result<Vec<u8>, PortolanError>;
}

/// HTTP probe hitting `{protocol}://{host}[:{port}]{doc_path}`.
///
/// No retries; the procurement loop retries implicitly on its next tick.
pub struct HttpDocProbe {
    client: reqwest::Client,
    doc_path: String,
}

impl HttpDocProbe {
    pub fn new(client: reqwest::Client, doc_path: impl Into<String>) -> Self {
        let doc_path = doc_path.into();
        let doc_path = if doc_path.starts_with('/') {
            doc_path
        } else {
            format!("/{doc_path}")
        };
        Self { client, doc_path }
    }
}

#[async_trait]
impl DocProbe for HttpDocProbe {
    async fn get_doc(
        &self,
        protocol: &str,
        host: &str,
        port: u16,
    ) -> Result<Vec<u8>, PortolanError> {
        let mut url = format!("{protocol}://{host}");
        if port > 0 {
            url.push_str(&format!(":{port}"));
        }
        url.push_str(&self.doc_path);

        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let body = resp.bytes().await?;
        if body.is_empty() {
            return Err(PortolanError::Internal("empty response".to_string()));
        }
        Ok(body.to_vec())
    }
}
