//! Parallel discovery of documents in the content tree.

mod task;

pub use task::{DiscoveryTask, FolderWalk};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::events::ScanEvent;
use crate::store::ContentStore;
use task::{EntryRole, classify};

/// Channel discovery events travel on towards the queue manager.
pub type EventSink = mpsc::UnboundedSender<ScanEvent>;

/// Sends an event unless the scan was cancelled.
pub(crate) fn emit(sink: &EventSink, cancel: &CancellationToken, event: ScanEvent) {
    if cancel.is_cancelled() {
        return;
    }
    let _ = sink.send(event);
}

/// Settings shared by the coordinator and its tasks.
#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    /// Tracked extension without the dot, lowercase.
    pub document_extension: String,
    pub batch_size: usize,
    pub state_folder: String,
}

impl DiscoveryOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            document_extension: config.document_extension.to_ascii_lowercase(),
            batch_size: config.discovery_batch_size.max(1),
            state_folder: config.state_folder.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_state_folder(&self, path: &str) -> bool {
        path.trim_end_matches('/') == self.state_folder
    }
}

/// Totals of one discovery pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub total_documents: usize,
    pub failed_folders: usize,
    pub cancelled: bool,
}

/// Fans the root's top-level folders out over bounded chunks of
/// [`DiscoveryTask`]s.
pub struct DiscoveryCoordinator<S: ContentStore> {
    store: Arc<S>,
    root: String,
    options: Arc<DiscoveryOptions>,
    max_concurrency: usize,
}

impl<S: ContentStore> std::fmt::Debug for DiscoveryCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryCoordinator")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl<S: ContentStore> DiscoveryCoordinator<S> {
    pub fn new(store: Arc<S>, config: &ScanConfig) -> Self {
        Self {
            store,
            root: config.root_path.clone(),
            options: Arc::new(DiscoveryOptions::from_config(config)),
            max_concurrency: config.max_discovery_concurrency.max(1),
        }
    }

    /// Discovers every document below the root.
    ///
    /// Each document is announced exactly once, either in a `FolderProgress`
    /// batch or in a `DocumentsDiscovered` event. Emits `DiscoveryComplete`
    /// once every folder task resolved, unless `cancel` fired first.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        sink: EventSink,
    ) -> DiscoverySummary {
        let mut summary = DiscoverySummary::default();

        let entries = match self.store.list(&self.root).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(target: "scan::discovery", root = %self.root, error = %err, "failed to list root folder");
                emit(
                    &sink,
                    &cancel,
                    ScanEvent::DiscoveryError {
                        folder: Some(self.root.clone()),
                        error: err.to_string(),
                    },
                );
                summary.failed_folders += 1;
                emit(
                    &sink,
                    &cancel,
                    ScanEvent::DiscoveryComplete { total_documents: 0 },
                );
                return summary;
            }
        };

        let mut folders = Vec::new();
        let mut root_documents = Vec::new();
        for entry in entries {
            match classify(entry, &self.options) {
                EntryRole::Folder(path) => folders.push(path),
                EntryRole::Document(document) => root_documents.push(document),
                EntryRole::Ignored => {}
            }
        }
        folders.sort();

        info!(
            target: "scan::discovery",
            root = %self.root,
            folders = folders.len(),
            root_documents = root_documents.len(),
            concurrency = self.max_concurrency,
            "discovery started"
        );
        emit(
            &sink,
            &cancel,
            ScanEvent::DiscoveryStarted {
                total_folders: folders.len(),
            },
        );
        if !root_documents.is_empty() {
            summary.total_documents += root_documents.len();
            emit(
                &sink,
                &cancel,
                ScanEvent::DocumentsDiscovered {
                    documents: root_documents,
                },
            );
        }

        for chunk in folders.chunks(self.max_concurrency) {
            if cancel.is_cancelled() {
                break;
            }
            let mut set = JoinSet::new();
            for folder in chunk {
                let task = DiscoveryTask::new(
                    Arc::clone(&self.store),
                    folder.clone(),
                    Arc::clone(&self.options),
                );
                let cancel = cancel.clone();
                let sink = sink.clone();
                set.spawn(async move {
                    let result = task.run(&cancel, &sink).await;
                    (task.folder().to_string(), result)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((folder, Ok(walk))) => {
                        summary.total_documents += walk.documents.len();
                        emit(
                            &sink,
                            &cancel,
                            ScanEvent::FolderComplete {
                                folder,
                                document_count: walk.documents.len(),
                                documents: walk.documents,
                            },
                        );
                        // Full batches already went out as FolderProgress.
                        if !walk.unreported.is_empty() {
                            emit(
                                &sink,
                                &cancel,
                                ScanEvent::DocumentsDiscovered {
                                    documents: walk.unreported,
                                },
                            );
                        }
                    }
                    Ok((folder, Err(err))) => {
                        summary.failed_folders += 1;
                        emit(
                            &sink,
                            &cancel,
                            ScanEvent::DiscoveryError {
                                folder: Some(folder),
                                error: err.to_string(),
                            },
                        );
                    }
                    Err(join_err) => {
                        summary.failed_folders += 1;
                        warn!(target: "scan::discovery", error = %join_err, "discovery task aborted");
                        emit(
                            &sink,
                            &cancel,
                            ScanEvent::DiscoveryError {
                                folder: None,
                                error: join_err.to_string(),
                            },
                        );
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            summary.cancelled = true;
            return summary;
        }
        info!(
            target: "scan::discovery",
            total_documents = summary.total_documents,
            failed_folders = summary.failed_folders,
            "discovery complete"
        );
        emit(
            &sink,
            &cancel,
            ScanEvent::DiscoveryComplete {
                total_documents: summary.total_documents,
            },
        );
        summary
    }
}
