use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::warn;

use super::{ContentStore, StoreEntry, join_path, normalize_path};
use crate::error::{StoreError, StoreResult};

/// Content tree mirrored on a local filesystem.
#[derive(Clone, Debug)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StoreResult<(String, PathBuf)> {
        let normalized = normalize_path(path)?;
        let local = self.root.join(normalized.trim_start_matches('/'));
        Ok((normalized, local))
    }

    fn map_io(path: &str, err: std::io::Error) -> StoreError {
        if err.kind() == ErrorKind::NotFound {
            StoreError::NotFound(path.to_string())
        } else {
            StoreError::Io(err)
        }
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn list(&self, folder: &str) -> StoreResult<Vec<StoreEntry>> {
        let (folder, local) = self.resolve(folder)?;
        let mut dir = fs::read_dir(&local)
            .await
            .map_err(|e| Self::map_io(&folder, e))?;

        let mut entries = Vec::new();
        while let Some(entry_res) = dir.next_entry().await.transpose() {
            let entry = match entry_res {
                Ok(entry) => entry,
                Err(e) => {
                    // The iterator does not recover from an error.
                    warn!(target: "scan::store", folder = %folder, error = %e, "directory listing cut short");
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(target: "scan::store", entry = %name, folder = %folder, error = %e, "skipping entry due to metadata error");
                    continue;
                }
            };
            let path = join_path(&folder, &name);
            if metadata.is_dir() {
                entries.push(StoreEntry::folder(path));
            } else {
                let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
                entries.push(StoreEntry::file(path, modified));
            }
        }
        Ok(entries)
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let (path, local) = self.resolve(path)?;
        fs::read(&local).await.map_err(|e| Self::map_io(&path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        let (path, local) = self.resolve(path)?;
        if path == "/" {
            return Err(StoreError::InvalidPath(path));
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write then rename so readers never observe a torn state file.
        let mut tmp = local.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &local).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let (_, local) = self.resolve(path)?;
        Ok(fs::try_exists(&local).await?)
    }
}
