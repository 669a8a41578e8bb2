use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::join_path;

/// Schema version written into every state file.
pub const STATE_VERSION: u16 = 1;

pub const LEASE_FILE: &str = "scan-lease.json";
pub const QUEUE_FILE: &str = "discovery-queue.json";
pub const RESULTS_FILE: &str = "scan-results.json";
pub const INDEX_FILE: &str = "asset-index.json";

/// Versioned envelope around every persisted record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFile<T> {
    pub version: u16,
    pub updated_at: DateTime<Utc>,
    pub data: T,
}

impl<T> StateFile<T> {
    pub fn new(data: T) -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            data,
        }
    }
}

/// Only the version, parsed before committing to a full decode.
#[derive(Deserialize)]
pub(crate) struct StateHeader {
    pub version: u16,
}

/// Locations of the four state files inside the state folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatePaths {
    pub folder: String,
    pub lease: String,
    pub queue: String,
    pub results: String,
    pub index: String,
}

impl StatePaths {
    pub fn new(folder: &str) -> Self {
        Self {
            folder: folder.trim_end_matches('/').to_string(),
            lease: join_path(folder, LEASE_FILE),
            queue: join_path(folder, QUEUE_FILE),
            results: join_path(folder, RESULTS_FILE),
            index: join_path(folder, INDEX_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_state_folder() {
        let paths = StatePaths::new("/.mediadex/");
        assert_eq!(paths.folder, "/.mediadex");
        assert_eq!(paths.lease, "/.mediadex/scan-lease.json");
        assert_eq!(paths.index, "/.mediadex/asset-index.json");
    }

    #[test]
    fn envelope_is_camel_case() {
        let json = serde_json::to_value(StateFile::new(vec![1, 2])).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["data"], serde_json::json!([1, 2]));
    }
}
