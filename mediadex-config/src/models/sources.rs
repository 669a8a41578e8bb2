use std::fs;
use std::path::{Path, PathBuf};

use mediadex_core::ScanConfig;
use serde::{Deserialize, Serialize};

use super::StoreConfig;
use crate::ConfigLoadError;
use crate::util::{non_empty, parse_csv};

/// Where the file-level settings came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// `MEDIADEX_CONFIG_PATH`.
    EnvPath(PathBuf),
    /// `MEDIADEX_CONFIG_JSON`.
    EnvInline,
}

/// Raw configuration as written in a TOML or JSON file. Every section is
/// optional; the environment may fill the gaps.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl FileConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let origin = path.display().to_string();

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents, &origin),
            Some("toml") | Some("tml") => {
                toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                    origin,
                    message: err.to_string(),
                })
            }
            _ => Self::parse_from_str(&contents, &origin),
        }
    }

    /// Tries TOML first, then JSON.
    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> Result<Self, ConfigLoadError> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                ConfigLoadError::Parse {
                    origin: origin.to_string(),
                    message: format!(
                        "toml error: {toml_err}; json error: {json_err}"
                    ),
                }
            })
        })
    }

    pub fn parse_json(raw: &str, origin: &str) -> Result<Self, ConfigLoadError> {
        serde_json::from_str(raw).map_err(|err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            message: err.to_string(),
        })
    }
}

/// Settings read from environment variables.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub store_url: Option<String>,
    pub store_token: Option<String>,
    pub local_root: Option<PathBuf>,
    pub root_path: Option<String>,
    pub content_hosts: Option<Vec<String>>,
}

impl EnvConfig {
    /// Reads the process environment.
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads every variable through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| non_empty(lookup(name));
        Self {
            config_path: var("MEDIADEX_CONFIG_PATH").map(PathBuf::from),
            config_json: var("MEDIADEX_CONFIG_JSON"),
            store_url: var("MEDIADEX_STORE_URL"),
            store_token: var("MEDIADEX_STORE_TOKEN"),
            local_root: var("MEDIADEX_LOCAL_ROOT").map(PathBuf::from),
            root_path: var("MEDIADEX_ROOT_PATH"),
            content_hosts: var("MEDIADEX_CONTENT_HOSTS").map(|raw| parse_csv(&raw)),
        }
    }
}
