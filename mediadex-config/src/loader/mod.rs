pub mod error;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use url::Url;

use crate::models::sources::{ConfigSource, EnvConfig, FileConfig};
use crate::models::{MediadexConfig, StoreConfig};
use error::ConfigLoadError;

/// A validated configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: MediadexConfig,
    pub source: ConfigSource,
    /// The `.env` file that contributed variables, if any.
    pub env_file: Option<PathBuf>,
}

/// Composes [`MediadexConfig`] from a `.env` file, the process environment
/// and an optional config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    env_file: Option<PathBuf>,
    skip_env_file: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `path` instead of looking for `.env` in the working directory.
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn without_env_file(mut self) -> Self {
        self.skip_env_file = true;
        self
    }

    /// Loads from the process environment, with `.env` entries filling in
    /// variables the process does not set.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (dotenv, env_file) = self.read_env_file()?;
        let env = EnvConfig::from_lookup(|name| {
            std::env::var(name)
                .ok()
                .or_else(|| dotenv.get(name).cloned())
        });
        let mut load = Self::load_with_env(env)?;
        load.env_file = env_file;
        Ok(load)
    }

    /// Composes and validates a configuration from already gathered
    /// variables.
    pub fn load_with_env(env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file, source) = if let Some(path) = env.config_path.as_ref() {
            (FileConfig::load_from_file(path)?, ConfigSource::EnvPath(path.clone()))
        } else if let Some(raw) = env.config_json.as_deref() {
            (
                FileConfig::parse_json(raw, "MEDIADEX_CONFIG_JSON")?,
                ConfigSource::EnvInline,
            )
        } else {
            (FileConfig::default(), ConfigSource::Default)
        };
        debug!(?source, "config file settings resolved");

        let store = resolve_store(&env, file.store)?;
        let mut scan = file.scan;
        if let Some(root_path) = env.root_path {
            scan.root_path = root_path;
        }
        if let Some(hosts) = env.content_hosts {
            scan.content_hosts = hosts;
        }

        validate_store(&store)?;
        scan.validate()?;

        info!(store = ?store, root = %scan.root_path, "configuration loaded");
        Ok(ConfigLoad {
            config: MediadexConfig { store, scan },
            source,
            env_file: None,
        })
    }

    fn read_env_file(
        &self,
    ) -> Result<(HashMap<String, String>, Option<PathBuf>), ConfigLoadError> {
        if self.skip_env_file {
            return Ok((HashMap::new(), None));
        }
        let path = self
            .env_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(".env"));
        let iter = match dotenvy::from_path_iter(&path) {
            Ok(iter) => iter,
            // Only an explicitly requested file has to exist.
            Err(err) if err.not_found() && self.env_file.is_none() => {
                return Ok((HashMap::new(), None));
            }
            Err(source) => return Err(ConfigLoadError::EnvFile { path, source }),
        };
        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|source| ConfigLoadError::EnvFile {
                path: path.clone(),
                source,
            })?;
            vars.insert(key, value);
        }
        debug!(path = %path.display(), vars = vars.len(), "env file read");
        Ok((vars, Some(path)))
    }
}

/// Environment variables take precedence over the file's store section.
fn resolve_store(
    env: &EnvConfig,
    file_store: Option<StoreConfig>,
) -> Result<StoreConfig, ConfigLoadError> {
    match (&env.store_url, &env.local_root) {
        (Some(_), Some(_)) => Err(ConfigLoadError::AmbiguousStore),
        (None, Some(root)) => Ok(StoreConfig::Local { root: root.clone() }),
        (Some(url), None) => {
            let file_token = match file_store {
                Some(StoreConfig::Http { token, .. }) => token,
                _ => None,
            };
            Ok(StoreConfig::Http {
                url: url.clone(),
                token: env.store_token.clone().or(file_token),
            })
        }
        (None, None) => match file_store {
            Some(StoreConfig::Http { url, token }) => Ok(StoreConfig::Http {
                url,
                token: env.store_token.clone().or(token),
            }),
            Some(local) => Ok(local),
            None => Err(ConfigLoadError::MissingStore),
        },
    }
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigLoadError> {
    match store {
        StoreConfig::Http { url, .. } => {
            let parsed = Url::parse(url).map_err(|source| {
                ConfigLoadError::InvalidStoreUrl {
                    url: url.clone(),
                    source,
                }
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigLoadError::UnsupportedScheme {
                    url: url.clone(),
                    scheme: parsed.scheme().to_string(),
                });
            }
            Ok(())
        }
        StoreConfig::Local { root } => {
            if is_dir(root) {
                Ok(())
            } else {
                Err(ConfigLoadError::MissingLocalRoot { path: root.clone() })
            }
        }
    }
}

fn is_dir(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvConfig {
        EnvConfig::default()
    }

    #[test]
    fn store_is_required() {
        assert!(matches!(
            ConfigLoader::load_with_env(env()),
            Err(ConfigLoadError::MissingStore)
        ));
    }

    #[test]
    fn url_and_local_root_conflict() {
        let env = EnvConfig {
            store_url: Some("https://cms.test".into()),
            local_root: Some(PathBuf::from("/tmp")),
            ..env()
        };
        assert!(matches!(
            ConfigLoader::load_with_env(env),
            Err(ConfigLoadError::AmbiguousStore)
        ));
    }

    #[test]
    fn store_url_must_be_http() {
        let env = EnvConfig {
            store_url: Some("ftp://cms.test".into()),
            ..env()
        };
        assert!(matches!(
            ConfigLoader::load_with_env(env),
            Err(ConfigLoadError::UnsupportedScheme { .. })
        ));

        let env = EnvConfig {
            store_url: Some("not a url".into()),
            ..EnvConfig::default()
        };
        assert!(matches!(
            ConfigLoader::load_with_env(env),
            Err(ConfigLoadError::InvalidStoreUrl { .. })
        ));
    }

    #[test]
    fn env_overrides_apply_to_defaults() {
        let env = EnvConfig {
            store_url: Some("https://cms.test/api".into()),
            store_token: Some("t0k".into()),
            root_path: Some("/site".into()),
            content_hosts: Some(vec!["cms.test".into()]),
            ..env()
        };
        let load = ConfigLoader::load_with_env(env).unwrap();
        assert_eq!(load.source, ConfigSource::Default);
        assert_eq!(
            load.config.store,
            StoreConfig::Http {
                url: "https://cms.test/api".into(),
                token: Some("t0k".into())
            }
        );
        assert_eq!(load.config.scan.root_path, "/site");
        assert_eq!(load.config.scan.content_hosts, vec!["cms.test".to_string()]);
    }

    #[test]
    fn inline_json_is_validated() {
        let env = EnvConfig {
            config_json: Some(
                r#"{"store": {"kind": "http", "url": "https://cms.test"},
                    "scan": {"lease": {"heartbeat_interval_secs": 60, "timeout_secs": 90}}}"#
                    .into(),
            ),
            ..env()
        };
        assert!(matches!(
            ConfigLoader::load_with_env(env),
            Err(ConfigLoadError::Scan(_))
        ));
    }
}
