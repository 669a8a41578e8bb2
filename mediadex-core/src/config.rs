use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Default extension of the markup documents that discovery tracks.
pub const DEFAULT_DOCUMENT_EXTENSION: &str = "html";

/// Folder holding the lease, queue, result and index files.
pub const DEFAULT_STATE_FOLDER: &str = "/.mediadex";

/// Heartbeats that may be missed before a lease counts as abandoned.
pub const MIN_MISSED_HEARTBEATS: u64 = 3;

/// Upper bound for lease durations. Keeps timestamp arithmetic in range.
pub const MAX_LEASE_SECS: u64 = 7 * 24 * 60 * 60;

/// Knobs for one scanning session.
///
/// All fields carry defaults so callers can supply a partial configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Folder the discovery walk starts from.
    pub root_path: String,
    /// Folder under which the four state files live. Never walked.
    pub state_folder: String,
    /// Extension (without dot) of tracked documents.
    pub document_extension: String,
    /// Documents a discovery task accumulates before reporting progress.
    pub discovery_batch_size: usize,
    /// Upper bound on concurrently walked top-level folders.
    pub max_discovery_concurrency: usize,
    /// Documents handed to the scan worker per batch.
    pub scan_batch_size: usize,
    /// Documents fetched and parsed concurrently within a batch.
    pub scan_concurrency: usize,
    /// Hosts that belong to the content tree. References to any other host
    /// are tagged external.
    pub content_hosts: Vec<String>,
    /// Capacity of the broadcast channel feeding event subscribers.
    pub event_channel_capacity: usize,
    pub lease: LeaseConfig,
    pub retry: RetryConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root_path: "/".to_string(),
            state_folder: DEFAULT_STATE_FOLDER.to_string(),
            document_extension: DEFAULT_DOCUMENT_EXTENSION.to_string(),
            discovery_batch_size: 50,
            max_discovery_concurrency: num_cpus::get().max(1),
            scan_batch_size: 10,
            scan_concurrency: 3,
            content_hosts: Vec::new(),
            event_channel_capacity: 1024,
            lease: LeaseConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.root_path.starts_with('/') {
            return Err(ScanError::InvalidConfig(format!(
                "root_path must be absolute, got '{}'",
                self.root_path
            )));
        }
        if !self.state_folder.starts_with('/') || self.state_folder == "/" {
            return Err(ScanError::InvalidConfig(format!(
                "state_folder must be an absolute sub folder, got '{}'",
                self.state_folder
            )));
        }
        if self.document_extension.is_empty()
            || self.document_extension.starts_with('.')
        {
            return Err(ScanError::InvalidConfig(
                "document_extension must be a bare extension such as 'html'"
                    .into(),
            ));
        }
        for (name, value) in [
            ("discovery_batch_size", self.discovery_batch_size),
            ("max_discovery_concurrency", self.max_discovery_concurrency),
            ("scan_batch_size", self.scan_batch_size),
            ("scan_concurrency", self.scan_concurrency),
            ("event_channel_capacity", self.event_channel_capacity),
        ] {
            if value == 0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        self.lease.validate()?;
        self.retry.validate()
    }
}

/// Scan lease heartbeat tuning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Cadence of lease renewals (seconds).
    pub heartbeat_interval_secs: u64,
    /// Age of the last heartbeat after which any session may reclaim the
    /// lease (seconds).
    pub timeout_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            timeout_secs: 5 * 60,
        }
    }
}

impl LeaseConfig {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Clamped to [`MAX_LEASE_SECS`] so unvalidated values cannot overflow.
    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.timeout_secs.min(MAX_LEASE_SECS) as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "lease.heartbeat_interval_secs must be greater than zero".into(),
            ));
        }
        for (name, value) in [
            ("lease.heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("lease.timeout_secs", self.timeout_secs),
        ] {
            if value > MAX_LEASE_SECS {
                return Err(ScanError::InvalidConfig(format!(
                    "{name} must not exceed {MAX_LEASE_SECS}"
                )));
            }
        }
        let required = self
            .heartbeat_interval_secs
            .checked_mul(MIN_MISSED_HEARTBEATS)
            .ok_or_else(|| {
                ScanError::InvalidConfig(
                    "lease.heartbeat_interval_secs is out of range".into(),
                )
            })?;
        if self.timeout_secs < required {
            return Err(ScanError::InvalidConfig(format!(
                "lease.timeout_secs ({}) must cover at least {} heartbeats of {}s",
                self.timeout_secs,
                MIN_MISSED_HEARTBEATS,
                self.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}

/// Backoff policy for state mutations that must succeed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Percentage-based jitter to spread out retries.
    pub jitter_ratio: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ScanError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ScanError::InvalidConfig(
                "retry.jitter_ratio must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }

    /// Un-jittered delay before retry number `attempt` (1-based).
    pub fn base_delay_ms(&self, attempt: u16) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let exp = i32::from(attempt.saturating_sub(1));
        let scaled = (self.backoff_base_ms as f64) * 2f64.powi(exp);
        scaled.min(self.backoff_max_ms as f64).max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ScanConfig::default().validate().unwrap();
    }

    #[test]
    fn timeout_must_cover_three_heartbeats() {
        let lease = LeaseConfig {
            heartbeat_interval_secs: 30,
            timeout_secs: 60,
        };
        assert!(lease.validate().is_err());
        let lease = LeaseConfig {
            heartbeat_interval_secs: 30,
            timeout_secs: 90,
        };
        assert!(lease.validate().is_ok());
    }

    #[test]
    fn oversized_lease_durations_are_rejected() {
        let lease = LeaseConfig {
            heartbeat_interval_secs: u64::MAX,
            timeout_secs: u64::MAX,
        };
        assert!(matches!(
            lease.validate(),
            Err(ScanError::InvalidConfig(msg)) if msg.contains("must not exceed")
        ));
        assert_eq!(
            lease.timeout(),
            chrono::Duration::seconds(MAX_LEASE_SECS as i64)
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ScanConfig {
            scan_concurrency: 0,
            ..ScanConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScanError::InvalidConfig(msg)) if msg.contains("scan_concurrency")
        ));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.base_delay_ms(0), 0);
        assert_eq!(retry.base_delay_ms(1), 500);
        assert_eq!(retry.base_delay_ms(2), 1_000);
        assert_eq!(retry.base_delay_ms(10), 10_000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"scan_concurrency": 5, "lease": {"timeout_secs": 600}}"#)
                .unwrap();
        assert_eq!(config.scan_concurrency, 5);
        assert_eq!(config.lease.timeout_secs, 600);
        assert_eq!(config.lease.heartbeat_interval_secs, 30);
        assert_eq!(config.document_extension, "html");
    }
}
