use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, Semaphore};

use super::{ContentStore, StoreEntry, normalize_path};
use crate::error::{StoreError, StoreResult};

#[derive(Clone, Debug)]
struct MemoryFile {
    content: Vec<u8>,
    modified_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, MemoryFile>,
    folders: BTreeSet<String>,
    failing: HashSet<String>,
    read_gates: Vec<(String, Arc<Semaphore>)>,
    list_gates: Vec<(String, Arc<Semaphore>)>,
}

/// Content tree held in memory. Used by tests and local experiments.
///
/// Folders exist implicitly for every file beneath them and can also be
/// created empty. Paths can be marked as failing to simulate outages, and
/// reads or listings can be gated behind a semaphore to pause a scan
/// mid-flight.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<RwLock<Inner>>,
}

impl std::fmt::Debug for MemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContentStore").finish_non_exhaustive()
    }
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a file, stamping it with the current time.
    pub async fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.insert_with_modified(path, content, Utc::now()).await;
    }

    pub async fn insert_with_modified(
        &self,
        path: &str,
        content: impl Into<Vec<u8>>,
        modified_at: DateTime<Utc>,
    ) {
        let path = normalize_path(path).unwrap_or_else(|_| path.to_string());
        let mut inner = self.inner.write().await;
        inner.files.insert(
            path,
            MemoryFile {
                content: content.into(),
                modified_at,
            },
        );
    }

    pub async fn create_folder(&self, path: &str) {
        let path = normalize_path(path).unwrap_or_else(|_| path.to_string());
        self.inner.write().await.folders.insert(path);
    }

    /// Moves the modification time of an existing file.
    pub async fn set_modified(&self, path: &str, modified_at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(file) = inner.files.get_mut(path) {
            file.modified_at = modified_at;
        }
    }

    pub async fn remove(&self, path: &str) -> bool {
        self.inner.write().await.files.remove(path).is_some()
    }

    /// Makes listings and reads of `path` fail with a 503.
    pub async fn fail_path(&self, path: &str) {
        self.inner.write().await.failing.insert(path.to_string());
    }

    pub async fn heal_path(&self, path: &str) {
        self.inner.write().await.failing.remove(path);
    }

    /// Makes every read of a path ending in `suffix` wait for a permit of the
    /// returned semaphore. Each read consumes one permit.
    pub async fn gate_reads(
        &self,
        suffix: &str,
        permits: usize,
    ) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(permits));
        self.inner
            .write()
            .await
            .read_gates
            .push((suffix.to_string(), Arc::clone(&gate)));
        gate
    }

    /// Makes every listing of `folder` wait for a permit of the returned
    /// semaphore. Each listing consumes one permit.
    pub async fn gate_listings(&self, folder: &str, permits: usize) -> Arc<Semaphore> {
        let folder = normalize_path(folder).unwrap_or_else(|_| folder.to_string());
        let gate = Arc::new(Semaphore::new(permits));
        self.inner
            .write()
            .await
            .list_gates
            .push((folder, Arc::clone(&gate)));
        gate
    }

    async fn pass_gate(
        &self,
        method: &'static str,
        path: &str,
        pick: impl Fn(&Inner) -> Option<Arc<Semaphore>>,
    ) -> StoreResult<()> {
        let gate = pick(&*self.inner.read().await);
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| Self::unavailable(method, path))?
                .forget();
        }
        Ok(())
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.inner.read().await.files.contains_key(path)
    }

    pub async fn read_string(&self, path: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .files
            .get(path)
            .map(|file| String::from_utf8_lossy(&file.content).into_owned())
    }

    fn unavailable(method: &'static str, path: &str) -> StoreError {
        StoreError::Status {
            method,
            path: path.to_string(),
            status: 503,
        }
    }

    fn folder_exists(inner: &Inner, folder: &str, prefix: &str) -> bool {
        folder == "/"
            || inner.folders.contains(folder)
            || inner.files.keys().any(|key| key.starts_with(prefix))
            || inner.folders.iter().any(|key| key.starts_with(prefix))
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn list(&self, folder: &str) -> StoreResult<Vec<StoreEntry>> {
        let folder = normalize_path(folder)?;
        self.pass_gate("LIST", &folder, |inner| {
            inner
                .list_gates
                .iter()
                .find(|(gated, _)| *gated == folder)
                .map(|(_, gate)| Arc::clone(gate))
        })
        .await?;
        let inner = self.inner.read().await;
        if inner.failing.contains(&folder) {
            return Err(Self::unavailable("LIST", &folder));
        }
        let prefix = if folder == "/" {
            "/".to_string()
        } else {
            format!("{folder}/")
        };
        if !Self::folder_exists(&inner, &folder, &prefix) {
            return Err(StoreError::NotFound(folder));
        }

        let mut entries = Vec::new();
        let mut seen_folders = BTreeSet::new();
        for (path, file) in inner.files.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    seen_folders.insert(child.to_string());
                }
                None => entries.push(StoreEntry::file(
                    path.clone(),
                    Some(file.modified_at),
                )),
            }
        }
        for path in inner.folders.iter() {
            if let Some(rest) = path.strip_prefix(&prefix) {
                let child = rest.split('/').next().unwrap_or(rest);
                if !child.is_empty() {
                    seen_folders.insert(child.to_string());
                }
            }
        }
        entries.extend(seen_folders.into_iter().map(|child| {
            StoreEntry::folder(format!("{prefix}{child}"))
        }));
        Ok(entries)
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let path = normalize_path(path)?;
        self.pass_gate("GET", &path, |inner| {
            inner
                .read_gates
                .iter()
                .find(|(suffix, _)| path.ends_with(suffix.as_str()))
                .map(|(_, gate)| Arc::clone(gate))
        })
        .await?;

        let inner = self.inner.read().await;
        if inner.failing.contains(&path) {
            return Err(Self::unavailable("GET", &path));
        }
        inner
            .files
            .get(&path)
            .map(|file| file.content.clone())
            .ok_or(StoreError::NotFound(path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().await;
        if inner.failing.contains(&path) {
            return Err(Self::unavailable("PUT", &path));
        }
        inner.files.insert(
            path,
            MemoryFile {
                content: content.to_vec(),
                modified_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let path = normalize_path(path)?;
        let inner = self.inner.read().await;
        let prefix = format!("{path}/");
        Ok(inner.files.contains_key(&path)
            || Self::folder_exists(&inner, &path, &prefix))
    }

    async fn compare_and_write(
        &self,
        path: &str,
        expected: Option<&[u8]>,
        content: &[u8],
    ) -> StoreResult<bool> {
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().await;
        if inner.failing.contains(&path) {
            return Err(Self::unavailable("PUT", &path));
        }
        let current = inner.files.get(&path).map(|file| file.content.as_slice());
        if current != expected {
            return Ok(false);
        }
        inner.files.insert(
            path,
            MemoryFile {
                content: content.to_vec(),
                modified_at: Utc::now(),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntryKind;

    #[tokio::test]
    async fn lists_files_and_implicit_folders() {
        let store = MemoryContentStore::new();
        store.insert("/index.html", "<html/>").await;
        store.insert("/blog/a.html", "<html/>").await;
        store.insert("/blog/2024/b.html", "<html/>").await;
        store.create_folder("/empty").await;

        let mut root = store.list("/").await.unwrap();
        root.sort_by(|a, b| a.path.cmp(&b.path));
        let summary: Vec<_> =
            root.iter().map(|e| (e.path.as_str(), e.kind)).collect();
        assert_eq!(
            summary,
            vec![
                ("/blog", EntryKind::Folder),
                ("/empty", EntryKind::Folder),
                ("/index.html", EntryKind::File),
            ]
        );

        let blog = store.list("/blog").await.unwrap();
        assert_eq!(blog.len(), 2);
        assert!(store.list("/empty").await.unwrap().is_empty());
        assert!(matches!(
            store.list("/missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn compare_and_write_detects_concurrent_change() {
        let store = MemoryContentStore::new();
        assert!(store.compare_and_write("/l.json", None, b"a").await.unwrap());
        assert!(!store.compare_and_write("/l.json", None, b"b").await.unwrap());
        assert!(
            store
                .compare_and_write("/l.json", Some(b"a"), b"c")
                .await
                .unwrap()
        );
        assert_eq!(store.read_string("/l.json").await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn failing_paths_return_transient_errors() {
        let store = MemoryContentStore::new();
        store.insert("/a/x.html", "x").await;
        store.fail_path("/a").await;
        let err = store.list("/a").await.unwrap_err();
        assert!(err.is_transient());
        store.heal_path("/a").await;
        assert!(store.list("/a").await.is_ok());
    }

    #[tokio::test]
    async fn gated_reads_wait_for_permits() {
        let store = MemoryContentStore::new();
        store.insert("/a.html", "x").await;
        let gate = store.gate_reads(".html", 0).await;

        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.read("/a.html").await })
        };
        tokio::task::yield_now().await;
        assert!(!reader.is_finished());

        gate.add_permits(1);
        assert_eq!(reader.await.unwrap().unwrap(), b"x");
    }

    #[tokio::test]
    async fn gated_listings_wait_for_permits() {
        let store = MemoryContentStore::new();
        store.insert("/sub/a.html", "x").await;
        let gate = store.gate_listings("/sub", 0).await;
        assert!(store.list("/").await.is_ok());

        let lister = {
            let store = store.clone();
            tokio::spawn(async move { store.list("/sub").await })
        };
        tokio::task::yield_now().await;
        assert!(!lister.is_finished());

        gate.add_permits(1);
        assert_eq!(lister.await.unwrap().unwrap().len(), 1);
    }
}
