//! Access to the remote content tree.
//!
//! Paths are absolute, `/`-separated and never contain `..` segments. Folders
//! have no trailing slash except the root `/`.

mod fs;
mod http;
mod memory;

pub use fs::FsContentStore;
pub use http::HttpContentStore;
pub use memory::MemoryContentStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Folder,
}

/// One child returned by [`ContentStore::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    /// Missing for folders and for stores that do not expose timestamps.
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl StoreEntry {
    pub fn file(
        path: impl Into<String>,
        last_modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        let path = path.into();
        Self {
            name: file_name(&path).to_string(),
            path,
            kind: EntryKind::File,
            last_modified_at,
        }
    }

    pub fn folder(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: file_name(&path).to_string(),
            path,
            kind: EntryKind::Folder,
            last_modified_at: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Lowercase extension of a file entry.
    pub fn extension(&self) -> Option<String> {
        if self.is_folder() {
            return None;
        }
        let (stem, ext) = self.name.rsplit_once('.')?;
        (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }
}

/// The content tree the scanner walks, reads documents from, and persists its
/// state files into.
///
/// Implementations must be safe for concurrent use from many tasks.
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Immediate children of `folder`. Order is unspecified.
    async fn list(&self, folder: &str) -> StoreResult<Vec<StoreEntry>>;

    /// Full content of the file at `path`.
    async fn read(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Creates or replaces the file at `path`, creating parent folders.
    async fn write(&self, path: &str, content: &[u8]) -> StoreResult<()>;

    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Like [`read`](Self::read) but maps a missing file to `None`.
    async fn read_optional(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Writes `content` only if the current content equals `expected`
    /// (`None` meaning absent). Returns whether the write happened.
    ///
    /// The default re-reads and compares, which narrows but does not close
    /// the race window. Stores with native conditional writes override it.
    async fn compare_and_write(
        &self,
        path: &str,
        expected: Option<&[u8]>,
        content: &[u8],
    ) -> StoreResult<bool> {
        let current = self.read_optional(path).await?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.write(path, content).await?;
        Ok(true)
    }
}

/// Validates and normalizes a store path: leading `/`, no empty or `.`
/// segments, no trailing slash.
pub fn normalize_path(path: &str) -> StoreResult<String> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(StoreError::InvalidPath(path.to_string())),
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Joins a child name onto a folder path.
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    format!("{folder}/{name}")
}

/// Parent folder of a path; the root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Last segment of a path.
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize_path("//a/./b/").unwrap(), "/a/b");
        assert_eq!(normalize_path("").unwrap(), "/");
        assert!(normalize_path("/a/../b").is_err());
    }

    #[test]
    fn join_and_parent() {
        assert_eq!(join_path("/", "a.html"), "/a.html");
        assert_eq!(join_path("/blog/", "/x.html"), "/blog/x.html");
        assert_eq!(parent_path("/blog/x.html"), "/blog");
        assert_eq!(parent_path("/x.html"), "/");
        assert_eq!(parent_path("/"), "/");
    }

    #[test]
    fn entry_extension_is_lowercase() {
        let entry = StoreEntry::file("/a/Index.HTML", None);
        assert_eq!(entry.name, "Index.HTML");
        assert_eq!(entry.extension().as_deref(), Some("html"));
        assert_eq!(StoreEntry::folder("/a/b.html").extension(), None);
        assert!(StoreEntry::folder("/.mediadex").is_hidden());
    }
}
