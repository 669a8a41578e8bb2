use chrono::{DateTime, Utc};

use crate::error::{ModelError, Result};

/// A markup document found during discovery. Identity is the path.
///
/// Descriptors are never mutated; a newer descriptor for the same path
/// supersedes the older one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DocumentDescriptor {
    pub path: String,
    pub name: String,
    pub last_modified_at: DateTime<Utc>,
}

impl DocumentDescriptor {
    pub fn new(
        path: impl Into<String>,
        name: impl Into<String>,
        last_modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            last_modified_at,
        }
    }

    /// Builds a descriptor from a store path, deriving the name from the
    /// last path segment.
    pub fn from_path(
        path: impl Into<String>,
        last_modified_at: DateTime<Utc>,
    ) -> Result<Self> {
        let path = path.into();
        let name = path
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| ModelError::InvalidPath(path.clone()))?
            .to_string();
        Ok(Self {
            path,
            name,
            last_modified_at,
        })
    }

    /// Folder portion of the path, always ending in `/`.
    pub fn folder(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..=idx],
            None => "/",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_uses_last_segment_as_name() {
        let doc =
            DocumentDescriptor::from_path("/blog/2024/post.html", Utc::now())
                .unwrap();
        assert_eq!(doc.name, "post.html");
        assert_eq!(doc.folder(), "/blog/2024/");
    }

    #[test]
    fn trailing_slash_is_not_a_document() {
        assert!(DocumentDescriptor::from_path("/blog/", Utc::now()).is_err());
    }
}
