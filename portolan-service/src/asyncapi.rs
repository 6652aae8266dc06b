use crate::transform::{doc_info, parse_doc, validate_asyncapi_doc};
use portolan_core::model::{arg_key, Args, AsyncapiItem};
use portolan_core::PortolanError;
use portolan_store::FsStore;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::error;

/// AsyncAPI façade: user-supplied documents, stored and served as-is.
pub struct AsyncapiService {
    store: Arc<FsStore>,
}

impl AsyncapiService {
    pub fn new(store: Arc<FsStore>) -> Self {
        Self { store }
    }

    /// All stored documents, decoded. Unreadable entries are logged and
    /// skipped.
    pub async fn get_docs(&self) -> Result<Vec<Value>, PortolanError> {
        let items = self.store.list().await;
        let mut tasks = JoinSet::new();
        for item in items {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let raw = match store.read(&item.id).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        error!(id = %item.id, error = %e, "Reading doc failed");
                        return None;
                    }
                };
                match serde_json::from_slice::<Value>(&raw) {
                    Ok(doc) => Some((item.id, doc)),
                    Err(e) => {
                        error!(id = %item.id, error = %e, "Decoding doc failed");
                        None
                    }
                }
            });
        }

        let mut wrapped: Vec<(String, Value)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(doc)) = joined {
                wrapped.push(doc);
            }
        }
        wrapped.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(wrapped.into_iter().map(|(_, doc)| doc).collect())
    }

    pub async fn get_doc(&self, id: &str) -> Result<Vec<u8>, PortolanError> {
        self.store.read(id).await
    }

    /// Validate and store a caller-supplied document under `id`.
    pub async fn put_doc(&self, id: &str, data: &[u8]) -> Result<(), PortolanError> {
        let doc =
            parse_doc(data).map_err(|e| PortolanError::InvalidInput(e.to_string()))?;
        validate_asyncapi_doc(&doc)?;
        let info = doc_info(&doc);

        let mut args = Args::new();
        args.push(arg_key::TITLE, info.title);
        args.push(arg_key::VERSION, info.version);
        args.push(arg_key::DESCRIPTION, info.description);
        self.store.write(id, args, data).await
    }

    pub async fn delete_doc(&self, id: &str) -> Result<(), PortolanError> {
        self.store.delete(id).await
    }

    pub async fn list_storage(&self) -> Result<Vec<AsyncapiItem>, PortolanError> {
        let mut items: Vec<AsyncapiItem> = self
            .store
            .list()
            .await
            .iter()
            .map(|data| AsyncapiItem {
                id: data.id.clone(),
                title: data.args.first(arg_key::TITLE).unwrap_or_default().to_string(),
                version: data
                    .args
                    .first(arg_key::VERSION)
                    .unwrap_or_default()
                    .to_string(),
                description: data
                    .args
                    .first(arg_key::DESCRIPTION)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    /// Healthy when the storage listing path responds.
    pub async fn health_check(&self) -> Result<(), PortolanError> {
        self.store.health_check().await
    }
}
