use chrono::{DateTime, Utc};

use crate::scan::ScanLease;

/// Live counters for the current scan. Derived data, never the source of
/// truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ScanStats {
    pub total_pages: usize,
    pub queued_pages: usize,
    pub scanned_pages: usize,
    pub total_assets: usize,
    pub errors: usize,
}

/// Live counters merged with what the state files say about earlier scans.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PersistentStats {
    pub current: ScanStats,
    pub scanned_documents: usize,
    pub indexed_assets: usize,
    pub pending_queue: usize,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub lease: Option<ScanLease>,
}
