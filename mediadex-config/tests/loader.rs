use std::fs;
use std::path::PathBuf;

use mediadex_config::{
    ConfigLoadError, ConfigLoader, ConfigSource, EnvConfig, StoreConfig,
};
use tempfile::TempDir;

#[test]
fn toml_file_with_local_store() {
    let tmp = TempDir::new().unwrap();
    let site = tmp.path().join("site");
    fs::create_dir(&site).unwrap();
    let config_path = tmp.path().join("mediadex.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[store]
kind = "local"
root = "{}"

[scan]
document_extension = "htm"
scan_batch_size = 25

[scan.lease]
heartbeat_interval_secs = 10
timeout_secs = 60
"#,
            site.display()
        ),
    )
    .unwrap();

    let env = EnvConfig {
        config_path: Some(config_path.clone()),
        ..EnvConfig::default()
    };
    let load = ConfigLoader::load_with_env(env).unwrap();
    assert_eq!(load.source, ConfigSource::EnvPath(config_path));
    assert_eq!(load.config.store, StoreConfig::Local { root: site });
    assert_eq!(load.config.scan.document_extension, "htm");
    assert_eq!(load.config.scan.scan_batch_size, 25);
    assert_eq!(load.config.scan.lease.timeout_secs, 60);
    assert_eq!(load.config.scan.scan_concurrency, 3);
}

#[test]
fn missing_local_root_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let env = EnvConfig {
        local_root: Some(tmp.path().join("absent")),
        ..EnvConfig::default()
    };
    assert!(matches!(
        ConfigLoader::load_with_env(env),
        Err(ConfigLoadError::MissingLocalRoot { .. })
    ));
}

#[test]
fn env_token_overrides_file_token() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("mediadex.json");
    fs::write(
        &config_path,
        r#"{"store": {"kind": "http", "url": "https://cms.test", "token": "from-file"}}"#,
    )
    .unwrap();

    let env = EnvConfig {
        config_path: Some(config_path),
        store_token: Some("from-env".into()),
        ..EnvConfig::default()
    };
    let load = ConfigLoader::load_with_env(env).unwrap();
    assert_eq!(
        load.config.store,
        StoreConfig::Http {
            url: "https://cms.test".into(),
            token: Some("from-env".into())
        }
    );
}

#[test]
fn unreadable_config_path_is_reported() {
    let env = EnvConfig {
        config_path: Some(PathBuf::from("/definitely/not/here.toml")),
        ..EnvConfig::default()
    };
    assert!(matches!(
        ConfigLoader::load_with_env(env),
        Err(ConfigLoadError::Read { .. })
    ));
}

#[test]
fn explicit_env_file_feeds_the_loader() {
    let tmp = TempDir::new().unwrap();
    let site = tmp.path().join("site");
    fs::create_dir(&site).unwrap();
    let env_file = tmp.path().join("test.env");
    fs::write(
        &env_file,
        format!(
            "MEDIADEX_LOCAL_ROOT={}\nMEDIADEX_ROOT_PATH=/docs\n",
            site.display()
        ),
    )
    .unwrap();

    // Only meaningful when the process itself does not configure a store.
    if std::env::var_os("MEDIADEX_STORE_URL").is_some()
        || std::env::var_os("MEDIADEX_LOCAL_ROOT").is_some()
        || std::env::var_os("MEDIADEX_CONFIG_PATH").is_some()
        || std::env::var_os("MEDIADEX_CONFIG_JSON").is_some()
        || std::env::var_os("MEDIADEX_ROOT_PATH").is_some()
    {
        return;
    }

    let load = ConfigLoader::new().with_env_file(&env_file).load().unwrap();
    assert_eq!(load.env_file, Some(env_file));
    assert_eq!(load.config.store, StoreConfig::Local { root: site });
    assert_eq!(load.config.scan.root_path, "/docs");
}

#[test]
fn explicit_env_file_must_exist() {
    let err = ConfigLoader::new()
        .with_env_file("/definitely/not/here.env")
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::EnvFile { .. }));
}
