pub mod sources;

use std::path::PathBuf;

use mediadex_core::ScanConfig;
use serde::{Deserialize, Serialize};

/// Where the content tree lives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Remote tree behind the list/source HTTP API.
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Tree mirrored in a local folder.
    Local { root: PathBuf },
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::Http { url, token } => f
                .debug_struct("Http")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "<redacted>"))
                .finish(),
            StoreConfig::Local { root } => {
                f.debug_struct("Local").field("root", root).finish()
            }
        }
    }
}

/// Effective configuration after files, environment and defaults were
/// merged and validated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediadexConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kind_is_tagged() {
        let store: StoreConfig =
            toml::from_str("kind = \"http\"\nurl = \"https://cms.test/api\"").unwrap();
        assert_eq!(
            store,
            StoreConfig::Http {
                url: "https://cms.test/api".into(),
                token: None
            }
        );
    }

    #[test]
    fn debug_hides_the_token() {
        let store = StoreConfig::Http {
            url: "https://cms.test".into(),
            token: Some("secret".into()),
        };
        let rendered = format!("{store:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
