//! Filesystem-backed store for opaque document bodies plus typed metadata.
//!
//! Every revision lives in its own UUID-named directory holding exactly two
//! files: `data` (JSON metadata) and `doc` (the raw body). The in-memory
//! index is authoritative for lookups; readers never scan the filesystem, so
//! a revision becomes visible only when its write transaction commits. A new
//! revision is written into a fresh directory and the index entry is swapped
//! afterwards; the old directory is removed best-effort once the swap is done.

use portolan_core::model::{Args, StorageData};
use portolan_core::PortolanError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};
use uuid::Uuid;

const DATA_FILE_NAME: &str = "data";
const DOC_FILE_NAME: &str = "doc";

/// One indexed revision: its metadata plus the directory carrying it.
#[derive(Debug, Clone)]
struct StorageItem {
    data: StorageData,
    dir_name: String,
}

/// Concurrent-read / single-writer document store rooted at one directory.
///
/// The data directory must be owned by a single process; the write lock covers
/// both the index and the file I/O of the revision swap.
pub struct FsStore {
    dir_path: PathBuf,
    name: &'static str,
    items: RwLock<HashMap<String, StorageItem>>,
}

impl FsStore {
    /// `name` tags log lines so multiple stores can share one process.
    pub fn new(dir_path: impl Into<PathBuf>, name: &'static str) -> Self {
        Self {
            dir_path: dir_path.into(),
            name,
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Rehydrate the index from the data directory, creating it if absent.
    ///
    /// A subdirectory with a corrupt or missing `data` file is logged and
    /// skipped; it does not fail init.
    pub async fn init(&self) -> Result<(), PortolanError> {
        if !fs::try_exists(&self.dir_path).await? {
            fs::create_dir_all(&self.dir_path).await?;
            return Ok(());
        }
        let mut items = self.items.write().await;
        let mut entries = fs::read_dir(&self.dir_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            let data = match read_data(&entry.path().join(DATA_FILE_NAME)).await {
                Ok(data) => data,
                Err(e) => {
                    error!(
                        store = self.name,
                        dir = %dir_name,
                        error = %e,
                        "Reading revision metadata failed, skipping"
                    );
                    continue;
                }
            };
            debug!(store = self.name, id = %data.id, dir = %dir_name, "Loaded revision");
            items.insert(data.id.clone(), StorageItem { data, dir_name });
        }
        Ok(())
    }

    /// Snapshot of all stored metadata.
    pub async fn list(&self) -> Vec<StorageData> {
        let items = self.items.read().await;
        items.values().map(|item| item.data.clone()).collect()
    }

    /// Replace (or create) the revision stored under `id`.
    ///
    /// A zero-length body is a hard error: the new directory is rolled back
    /// and the previous revision stays both on disk and in the index.
    pub async fn write(&self, id: &str, args: Args, body: &[u8]) -> Result<(), PortolanError> {
        let mut items = self.items.write().await;
        let new_dir_name = Uuid::new_v4().to_string();
        let new_dir = self.dir_path.join(&new_dir_name);
        fs::create_dir(&new_dir).await?;

        let data = StorageData {
            id: id.to_string(),
            args,
        };
        if let Err(err) = write_revision(&new_dir, &data, body).await {
            if let Err(e) = fs::remove_dir_all(&new_dir).await {
                error!(
                    store = self.name,
                    id,
                    dir = %new_dir_name,
                    error = %e,
                    "Removing new revision dir failed"
                );
            }
            return Err(err);
        }

        let old_dir_name = items.get(id).map(|item| item.dir_name.clone());
        items.insert(
            id.to_string(),
            StorageItem {
                data,
                dir_name: new_dir_name.clone(),
            },
        );
        if let Some(old_dir_name) = old_dir_name {
            if let Err(e) = fs::remove_dir_all(self.dir_path.join(&old_dir_name)).await {
                warn!(
                    store = self.name,
                    id,
                    dir = %old_dir_name,
                    error = %e,
                    "Removing old revision dir failed"
                );
            }
        }
        debug!(store = self.name, id, dir = %new_dir_name, "Revision written");
        Ok(())
    }

    /// Raw body of the revision stored under `id`.
    pub async fn read(&self, id: &str) -> Result<Vec<u8>, PortolanError> {
        let items = self.items.read().await;
        let item = items
            .get(id)
            .ok_or_else(|| PortolanError::NotFound(id.to_string()))?;
        let doc = fs::read(self.dir_path.join(&item.dir_name).join(DOC_FILE_NAME)).await?;
        Ok(doc)
    }

    /// Probe the index read path, the same lock a listing takes.
    pub async fn health_check(&self) -> Result<(), PortolanError> {
        let _ = self.items.read().await;
        Ok(())
    }

    /// Remove the revision stored under `id`.
    ///
    /// If the directory removal fails the index is left unchanged.
    pub async fn delete(&self, id: &str) -> Result<(), PortolanError> {
        let mut items = self.items.write().await;
        let item = items
            .get(id)
            .ok_or_else(|| PortolanError::NotFound(id.to_string()))?;
        fs::remove_dir_all(self.dir_path.join(&item.dir_name)).await?;
        items.remove(id);
        debug!(store = self.name, id, "Revision deleted");
        Ok(())
    }
}

async fn write_revision(dir: &Path, data: &StorageData, body: &[u8]) -> Result<(), PortolanError> {
    fs::write(dir.join(DATA_FILE_NAME), serde_json::to_vec(data)?).await?;
    fs::write(dir.join(DOC_FILE_NAME), body).await?;
    if body.is_empty() {
        return Err(PortolanError::Internal("0 bytes written".to_string()));
    }
    Ok(())
}

async fn read_data(path: &Path) -> Result<StorageData, PortolanError> {
    let raw = fs::read(path).await?;
    let data: StorageData = serde_json::from_slice(&raw)?;
    Ok(data)
}
