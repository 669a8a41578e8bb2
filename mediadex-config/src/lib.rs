//! Configuration loading for mediadex.
//!
//! Settings come from, in order of precedence: process environment, a `.env`
//! file, an inline JSON document (`MEDIADEX_CONFIG_JSON`) or a TOML/JSON file
//! (`MEDIADEX_CONFIG_PATH`), and finally built-in defaults.

pub mod loader;
pub mod models;
pub mod util;

pub use loader::{ConfigLoad, ConfigLoader, error::ConfigLoadError};
pub use models::sources::{ConfigSource, EnvConfig, FileConfig};
pub use models::{MediadexConfig, StoreConfig};
