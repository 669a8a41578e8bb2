use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use mediadex_model::DocumentDescriptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{DiscoveryOptions, EventSink, emit};
use crate::error::{Result, ScanError};
use crate::events::ScanEvent;
use crate::store::{ContentStore, StoreEntry};

/// Breadth-first walk of one top-level folder.
pub struct DiscoveryTask<S: ContentStore> {
    store: Arc<S>,
    folder: String,
    options: Arc<DiscoveryOptions>,
}

impl<S: ContentStore> std::fmt::Debug for DiscoveryTask<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryTask")
            .field("folder", &self.folder)
            .finish()
    }
}

/// Result of walking one top-level folder.
#[derive(Clone, Debug, Default)]
pub struct FolderWalk {
    /// Every tracked document found, in walk order.
    pub documents: Vec<DocumentDescriptor>,
    /// Trailing documents not yet reported through `FolderProgress`.
    pub unreported: Vec<DocumentDescriptor>,
}

/// How a listed entry takes part in the walk.
pub(crate) enum EntryRole {
    Document(DocumentDescriptor),
    Folder(String),
    Ignored,
}

/// Classifies an entry: tracked documents, walkable folders, everything
/// else ignored. Hidden entries and the state folder are never walked.
pub(crate) fn classify(entry: StoreEntry, options: &DiscoveryOptions) -> EntryRole {
    if entry.is_hidden() {
        return EntryRole::Ignored;
    }
    if entry.is_folder() {
        if options.is_state_folder(&entry.path) {
            return EntryRole::Ignored;
        }
        return EntryRole::Folder(entry.path);
    }
    if entry.extension().as_deref() != Some(options.document_extension.as_str()) {
        return EntryRole::Ignored;
    }
    // Without a timestamp the document always counts as changed.
    let modified = entry.last_modified_at.unwrap_or_else(Utc::now);
    EntryRole::Document(DocumentDescriptor::new(entry.path, entry.name, modified))
}

impl<S: ContentStore> DiscoveryTask<S> {
    pub fn new(
        store: Arc<S>,
        folder: impl Into<String>,
        options: Arc<DiscoveryOptions>,
    ) -> Self {
        Self {
            store,
            folder: folder.into(),
            options,
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Walks the subtree and returns every tracked document found.
    ///
    /// Emits `FolderProgress` every `batch_size` documents; the remainder
    /// comes back as [`FolderWalk::unreported`]. A nested folder
    /// that cannot be listed is reported and skipped; failing to list the
    /// task's own folder aborts the task.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        sink: &EventSink,
    ) -> Result<FolderWalk> {
        let mut pending = VecDeque::from([self.folder.clone()]);
        let mut found = Vec::new();
        let mut batch = Vec::with_capacity(self.options.batch_size);
        let mut first = true;

        while let Some(folder) = pending.pop_front() {
            if cancel.is_cancelled() {
                debug!(target: "scan::discovery", folder = %self.folder, "discovery task cancelled");
                break;
            }
            let entries = match self.store.list(&folder).await {
                Ok(entries) => entries,
                Err(err) if first => {
                    warn!(target: "scan::discovery", folder = %folder, error = %err, "failed to list discovery root");
                    emit(
                        sink,
                        cancel,
                        ScanEvent::FolderDiscoveryError {
                            folder: folder.clone(),
                            error: err.to_string(),
                        },
                    );
                    return Err(ScanError::Store(err));
                }
                Err(err) => {
                    warn!(target: "scan::discovery", folder = %folder, error = %err, "skipping unlistable folder");
                    emit(
                        sink,
                        cancel,
                        ScanEvent::FolderScanError {
                            folder,
                            error: err.to_string(),
                        },
                    );
                    continue;
                }
            };
            first = false;

            for entry in entries {
                match classify(entry, &self.options) {
                    EntryRole::Folder(path) => pending.push_back(path),
                    EntryRole::Document(document) => {
                        batch.push(document.clone());
                        found.push(document);
                        if batch.len() >= self.options.batch_size {
                            emit(
                                sink,
                                cancel,
                                ScanEvent::FolderProgress {
                                    folder: self.folder.clone(),
                                    documents: std::mem::take(&mut batch),
                                    total_found: found.len(),
                                },
                            );
                        }
                    }
                    EntryRole::Ignored => {}
                }
            }
        }

        debug!(target: "scan::discovery", folder = %self.folder, documents = found.len(), "discovery task finished");
        Ok(FolderWalk {
            documents: found,
            unreported: batch,
        })
    }
}
