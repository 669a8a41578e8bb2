use mediadex_model::{AssetFragment, DocumentDescriptor, ScanStats, SessionId};
use serde::{Deserialize, Serialize};

/// Why an already known document was not enqueued again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A scan result newer than the document exists.
    AlreadyScanned,
    /// The document is already waiting in the pending queue.
    AlreadyQueued,
}

/// Why a scanning session stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum StopReason {
    /// Discovery finished and the queue drained.
    Completed,
    /// The caller stopped the scan; the queue was persisted for resumption.
    Stopped,
    /// Another session took over the lease.
    LeaseLost,
    /// The scan aborted on an unrecoverable error.
    Failed(String),
}

/// Notifications observed by presentation layers and the queue manager.
///
/// Events are emitted in causal order per producer. No ordering holds across
/// concurrent discovery tasks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScanEvent {
    #[serde(rename_all = "camelCase")]
    ScanningStarted {
        session_id: SessionId,
        scan_type: mediadex_model::ScanType,
    },
    #[serde(rename_all = "camelCase")]
    ScanningStopped { reason: StopReason, stats: ScanStats },
    #[serde(rename_all = "camelCase")]
    ResumingFromQueue { queue_size: usize },

    #[serde(rename_all = "camelCase")]
    DiscoveryStarted { total_folders: usize },
    #[serde(rename_all = "camelCase")]
    FolderProgress {
        folder: String,
        documents: Vec<DocumentDescriptor>,
        total_found: usize,
    },
    #[serde(rename_all = "camelCase")]
    FolderComplete {
        folder: String,
        documents: Vec<DocumentDescriptor>,
        document_count: usize,
    },
    /// A nested folder could not be listed. The walk continues.
    #[serde(rename_all = "camelCase")]
    FolderScanError { folder: String, error: String },
    /// The top-level folder of a discovery task could not be listed.
    #[serde(rename_all = "camelCase")]
    FolderDiscoveryError { folder: String, error: String },
    #[serde(rename_all = "camelCase")]
    DocumentsDiscovered { documents: Vec<DocumentDescriptor> },
    #[serde(rename_all = "camelCase")]
    DocumentsSkipped {
        count: usize,
        documents: Vec<String>,
        reason: SkipReason,
    },
    #[serde(rename_all = "camelCase")]
    DiscoveryComplete { total_documents: usize },
    #[serde(rename_all = "camelCase")]
    DiscoveryError {
        folder: Option<String>,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    QueueSizeUpdate { queue_size: usize },
    #[serde(rename_all = "camelCase")]
    PageScanned {
        path: String,
        assets: Vec<AssetFragment>,
        asset_count: usize,
        scan_duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    PageScanError { page: String, error: String },
    #[serde(rename_all = "camelCase")]
    WorkerError { error: String },
    /// A state file could not be written after all retries.
    #[serde(rename_all = "camelCase")]
    StateWriteError { path: String, error: String },
    /// `holder` is `None` when the lease record was cleared.
    #[serde(rename_all = "camelCase")]
    LeaseLost { holder: Option<SessionId> },
}

impl ScanEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanEvent::ScanningStarted { .. } => "scanning_started",
            ScanEvent::ScanningStopped { .. } => "scanning_stopped",
            ScanEvent::ResumingFromQueue { .. } => "resuming_from_queue",
            ScanEvent::DiscoveryStarted { .. } => "discovery_started",
            ScanEvent::FolderProgress { .. } => "folder_progress",
            ScanEvent::FolderComplete { .. } => "folder_complete",
            ScanEvent::FolderScanError { .. } => "folder_scan_error",
            ScanEvent::FolderDiscoveryError { .. } => "folder_discovery_error",
            ScanEvent::DocumentsDiscovered { .. } => "documents_discovered",
            ScanEvent::DocumentsSkipped { .. } => "documents_skipped",
            ScanEvent::DiscoveryComplete { .. } => "discovery_complete",
            ScanEvent::DiscoveryError { .. } => "discovery_error",
            ScanEvent::QueueSizeUpdate { .. } => "queue_size_update",
            ScanEvent::PageScanned { .. } => "page_scanned",
            ScanEvent::PageScanError { .. } => "page_scan_error",
            ScanEvent::WorkerError { .. } => "worker_error",
            ScanEvent::StateWriteError { .. } => "state_write_error",
            ScanEvent::LeaseLost { .. } => "lease_lost",
        }
    }

    /// Whether the event counts towards `ScanStats::errors`.
    ///
    /// `FolderDiscoveryError` is always followed by a `DiscoveryError` for the
    /// same folder and is not counted twice.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ScanEvent::FolderScanError { .. }
                | ScanEvent::DiscoveryError { .. }
                | ScanEvent::PageScanError { .. }
                | ScanEvent::WorkerError { .. }
                | ScanEvent::StateWriteError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = ScanEvent::QueueSizeUpdate { queue_size: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "queueSizeUpdate");
        assert_eq!(json["queueSize"], 3);
    }

    #[test]
    fn folder_discovery_errors_are_not_double_counted() {
        assert!(
            !ScanEvent::FolderDiscoveryError {
                folder: "/a".into(),
                error: "boom".into()
            }
            .is_error()
        );
        assert!(
            ScanEvent::DiscoveryError {
                folder: Some("/a".into()),
                error: "boom".into()
            }
            .is_error()
        );
    }
}
