use std::path::PathBuf;

use mediadex_core::ScanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error(
        "no content store configured; set MEDIADEX_STORE_URL or MEDIADEX_LOCAL_ROOT"
    )]
    MissingStore,

    #[error("MEDIADEX_STORE_URL and MEDIADEX_LOCAL_ROOT are mutually exclusive")]
    AmbiguousStore,

    #[error("invalid store url '{url}': {source}")]
    InvalidStoreUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("store url '{url}' must use http or https, not {scheme}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("local store root {path} is not a directory")]
    MissingLocalRoot { path: PathBuf },

    #[error("invalid scan settings: {0}")]
    Scan(#[from] ScanError),
}
