use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{ContentStore, EntryKind, StoreEntry, join_path, normalize_path};
use crate::error::{StoreError, StoreResult};

/// Entry of a `GET {base}/list{path}` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteEntry {
    name: String,
    #[serde(default)]
    path: Option<String>,
    /// Files carry an extension, folders do not.
    #[serde(default)]
    ext: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    last_modified: Option<i64>,
}

/// Content tree served over HTTP.
///
/// `GET {base}/list{path}` lists a folder, `GET|PUT|HEAD {base}/source{path}`
/// read, write and probe a file.
#[derive(Clone, Debug)]
pub struct HttpContentStore {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpContentStore {
    pub fn new(base: Url, token: Option<String>) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("mediadex/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base, token))
    }

    pub fn with_client(client: Client, base: Url, token: Option<String>) -> Self {
        Self {
            client,
            base,
            token,
        }
    }

    fn endpoint(&self, kind: &str, path: &str) -> StoreResult<(String, Url)> {
        let path = normalize_path(path)?;
        let base = self.base.as_str().trim_end_matches('/');
        let raw = if path == "/" {
            format!("{base}/{kind}/")
        } else {
            format!("{base}/{kind}{path}")
        };
        let url = Url::parse(&raw)
            .map_err(|e| StoreError::InvalidPath(format!("{path}: {e}")))?;
        Ok((path, url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check(
        method: &'static str,
        path: &str,
        status: StatusCode,
    ) -> StoreResult<()> {
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                method,
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn into_entry(folder: &str, remote: RemoteEntry) -> StoreResult<StoreEntry> {
        if remote.name.is_empty() || remote.name.contains('/') {
            return Err(StoreError::InvalidListing {
                path: folder.to_string(),
                reason: format!("bad entry name '{}'", remote.name),
            });
        }
        let path = match remote.path {
            Some(path) => normalize_path(&path)?,
            None => join_path(folder, &remote.name),
        };
        let kind = if remote.ext.as_deref().is_some_and(|ext| !ext.is_empty())
        {
            EntryKind::File
        } else {
            EntryKind::Folder
        };
        let last_modified_at = remote
            .last_modified
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        Ok(StoreEntry {
            name: remote.name,
            path,
            kind,
            last_modified_at: match kind {
                EntryKind::File => last_modified_at,
                EntryKind::Folder => None::<DateTime<Utc>>,
            },
        })
    }

    /// Converts a listing, skipping malformed entries.
    fn into_entries(folder: &str, remote: Vec<RemoteEntry>) -> Vec<StoreEntry> {
        remote
            .into_iter()
            .filter_map(|entry| match Self::into_entry(folder, entry) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(target: "scan::store", folder = %folder, error = %err, "skipping malformed listing entry");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn list(&self, folder: &str) -> StoreResult<Vec<StoreEntry>> {
        let (folder, url) = self.endpoint("list", folder)?;
        debug!(target: "scan::store", folder = %folder, "listing folder");
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::check("GET", &folder, response.status())?;
        let remote: Vec<RemoteEntry> = response.json().await.map_err(|e| {
            StoreError::InvalidListing {
                path: folder.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::into_entries(&folder, remote))
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let (path, url) = self.endpoint("source", path)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::check("GET", &path, response.status())?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn write(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        let (path, url) = self.endpoint("source", path)?;
        let response = self
            .authorize(self.client.put(url))
            .body(content.to_vec())
            .send()
            .await?;
        Self::check("PUT", &path, response.status())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let (path, url) = self.endpoint("source", path)?;
        let response = self.authorize(self.client.head(url)).send().await?;
        match Self::check("HEAD", &path, response.status()) {
            Ok(()) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HttpContentStore {
        HttpContentStore::with_client(
            Client::new(),
            Url::parse("https://content.test/api/").unwrap(),
            None,
        )
    }

    #[test]
    fn builds_list_and_source_urls() {
        let store = store();
        let (_, url) = store.endpoint("list", "/").unwrap();
        assert_eq!(url.as_str(), "https://content.test/api/list/");
        let (path, url) = store.endpoint("source", "blog//a.html").unwrap();
        assert_eq!(path, "/blog/a.html");
        assert_eq!(url.as_str(), "https://content.test/api/source/blog/a.html");
    }

    #[test]
    fn entries_without_extension_are_folders() {
        let remote: Vec<RemoteEntry> = serde_json::from_str(
            r#"[
                {"name": "blog", "path": "/blog"},
                {"name": "a.html", "ext": "html", "lastModified": 1700000000000}
            ]"#,
        )
        .unwrap();
        let entries: Vec<_> = remote
            .into_iter()
            .map(|e| HttpContentStore::into_entry("/", e).unwrap())
            .collect();
        assert_eq!(entries[0].kind, EntryKind::Folder);
        assert_eq!(entries[1].kind, EntryKind::File);
        assert_eq!(entries[1].path, "/a.html");
        assert_eq!(
            entries[1].last_modified_at.unwrap().timestamp_millis(),
            1_700_000_000_000
        );
    }

    #[test]
    fn names_with_separators_are_rejected() {
        let remote = RemoteEntry {
            name: "a/b".into(),
            path: None,
            ext: None,
            last_modified: None,
        };
        assert!(HttpContentStore::into_entry("/", remote).is_err());
    }

    #[test]
    fn malformed_entries_do_not_fail_the_listing() {
        let remote: Vec<RemoteEntry> = serde_json::from_str(
            r#"[
                {"name": "a.html", "ext": "html"},
                {"name": "x/y.html", "ext": "html"},
                {"name": "", "ext": "html"},
                {"name": "evil", "path": "/../etc"},
                {"name": "b.html", "ext": "html"}
            ]"#,
        )
        .unwrap();
        let paths: Vec<_> = HttpContentStore::into_entries("/blog", remote)
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        assert_eq!(paths, vec!["/blog/a.html", "/blog/b.html"]);
    }
}
