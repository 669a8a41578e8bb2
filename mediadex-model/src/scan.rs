use chrono::{DateTime, Duration, Utc};

use crate::asset::AssetFragment;
use crate::document::DocumentDescriptor;
use crate::ids::SessionId;

/// Outcome of the last successful scan of one document. One record per path,
/// overwritten on rescan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ScanResultRecord {
    pub path: String,
    pub last_scanned_at: DateTime<Utc>,
    pub asset_count: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    pub assets: Vec<AssetFragment>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub checksum: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub scan_duration_ms: u64,
}

/// Inclusion rule for (re)scanning a document.
///
/// A document is scanned when it has never been scanned, when it changed
/// after the last scan, or when a forced rescan was requested.
pub fn needs_scan(
    document: &DocumentDescriptor,
    record: Option<&ScanResultRecord>,
    force_rescan: bool,
) -> bool {
    if force_rescan {
        return true;
    }
    match record {
        None => true,
        Some(record) => document.last_modified_at > record.last_scanned_at,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ScanType {
    /// Rebuild the index from scratch.
    Full,
    /// Scan only new or changed documents, resuming any persisted queue.
    #[default]
    Incremental,
    /// Rescan every document, ignoring prior results.
    Force,
}

impl ScanType {
    pub fn from_force(force_rescan: bool) -> Self {
        if force_rescan {
            ScanType::Force
        } else {
            ScanType::Incremental
        }
    }

    /// Whether prior scan results are ignored by the inclusion rule.
    pub fn ignores_history(self) -> bool {
        matches!(self, ScanType::Full | ScanType::Force)
    }
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanType::Full => write!(f, "full"),
            ScanType::Incremental => write!(f, "incremental"),
            ScanType::Force => write!(f, "force"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LeaseStatus {
    #[default]
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LeaseProgress {
    pub total_documents: usize,
    pub scanned_documents: usize,
    pub total_assets: usize,
}

/// Tree-wide advisory scan lock. Exactly one lease record exists per content
/// tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ScanLease {
    pub is_active: bool,
    pub session_id: SessionId,
    pub scan_type: ScanType,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: LeaseStatus,
    #[cfg_attr(feature = "serde", serde(default))]
    pub progress: LeaseProgress,
}

impl ScanLease {
    pub fn acquire(
        session_id: SessionId,
        scan_type: ScanType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            is_active: true,
            session_id,
            scan_type,
            started_at: now,
            last_heartbeat_at: now,
            status: LeaseStatus::Running,
            progress: LeaseProgress::default(),
        }
    }

    /// An active lease whose heartbeat is older than `timeout`.
    pub fn is_abandoned(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.is_active && now - self.last_heartbeat_at > timeout
    }

    /// Whether `session` is locked out by this lease.
    pub fn blocks(
        &self,
        session: &SessionId,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> bool {
        self.is_active
            && &self.session_id != session
            && !self.is_abandoned(now, timeout)
    }

    pub fn release(&mut self, status: LeaseStatus, now: DateTime<Utc>) {
        self.is_active = false;
        self.status = status;
        self.last_heartbeat_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(modified: DateTime<Utc>) -> DocumentDescriptor {
        DocumentDescriptor::new("/a.html", "a.html", modified)
    }

    fn record(scanned: DateTime<Utc>) -> ScanResultRecord {
        ScanResultRecord {
            path: "/a.html".into(),
            last_scanned_at: scanned,
            asset_count: 0,
            assets: Vec::new(),
            checksum: None,
            scan_duration_ms: 0,
        }
    }

    #[test]
    fn unscanned_documents_need_scan() {
        assert!(needs_scan(&doc(Utc::now()), None, false));
    }

    #[test]
    fn unchanged_documents_are_skipped_unless_forced() {
        let now = Utc::now();
        let earlier = now - Duration::minutes(5);
        assert!(!needs_scan(&doc(earlier), Some(&record(now)), false));
        assert!(!needs_scan(&doc(now), Some(&record(now)), false));
        assert!(needs_scan(&doc(earlier), Some(&record(now)), true));
    }

    #[test]
    fn modified_documents_need_scan() {
        let now = Utc::now();
        let earlier = now - Duration::minutes(5);
        assert!(needs_scan(&doc(now), Some(&record(earlier)), false));
    }

    #[test]
    fn stale_lease_no_longer_blocks() {
        let now = Utc::now();
        let holder = SessionId::new();
        let other = SessionId::new();
        let mut lease = ScanLease::acquire(holder.clone(), ScanType::Incremental, now);
        let timeout = Duration::minutes(5);

        assert!(lease.blocks(&other, now, timeout));
        assert!(!lease.blocks(&holder, now, timeout));

        lease.last_heartbeat_at = now - Duration::minutes(6);
        assert!(lease.is_abandoned(now, timeout));
        assert!(!lease.blocks(&other, now, timeout));

        lease.release(LeaseStatus::Completed, now);
        assert!(!lease.blocks(&other, now, timeout));
    }
}
