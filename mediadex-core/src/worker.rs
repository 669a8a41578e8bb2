//! Batch scanning of discovered documents.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use mediadex_model::{AssetFragment, DocumentDescriptor};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::extract::{Extractor, dedup_fragments};
use crate::store::ContentStore;

pub type BatchId = u64;

/// A slice of the queue handed to the worker.
#[derive(Clone, Debug)]
pub struct ScanBatch {
    pub id: BatchId,
    pub documents: Vec<DocumentDescriptor>,
}

/// Successful scan of one document.
#[derive(Clone, Debug)]
pub struct ScannedPage {
    pub document: DocumentDescriptor,
    pub fragments: Vec<AssetFragment>,
    /// SHA-256 of the raw content, hex encoded.
    pub checksum: String,
    /// Taken before the read so that edits racing the scan trigger a rescan.
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Reports from the worker to the queue manager.
#[derive(Debug)]
pub enum WorkerOutput {
    Scanned(ScannedPage),
    Failed { path: String, error: String },
    /// Every document of the batch was reported (or skipped on cancel).
    BatchFinished { id: BatchId },
    /// The batch task panicked; unreported documents are lost for this pass.
    BatchPanicked { id: BatchId, error: String },
}

pub fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Scans batches one after another, each with bounded per-document
/// concurrency.
pub struct ScanWorker<S: ContentStore> {
    store: Arc<S>,
    extractor: Arc<Extractor>,
    concurrency: usize,
}

impl<S: ContentStore> std::fmt::Debug for ScanWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanWorker")
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl<S: ContentStore> Clone for ScanWorker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            extractor: Arc::clone(&self.extractor),
            concurrency: self.concurrency,
        }
    }
}

impl<S: ContentStore> ScanWorker<S> {
    pub fn new(store: Arc<S>, extractor: Arc<Extractor>, concurrency: usize) -> Self {
        Self {
            store,
            extractor,
            concurrency: concurrency.max(1),
        }
    }

    /// Drains `inbox` until it closes or `cancel` fires.
    pub async fn run(
        self,
        mut inbox: mpsc::UnboundedReceiver<ScanBatch>,
        outputs: mpsc::UnboundedSender<WorkerOutput>,
        cancel: CancellationToken,
    ) {
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = inbox.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };
            let id = batch.id;
            let worker = self.clone();
            let batch_outputs = outputs.clone();
            let batch_cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                worker.scan_batch(batch, &batch_outputs, &batch_cancel).await
            });
            let report = match handle.await {
                Ok(()) => WorkerOutput::BatchFinished { id },
                Err(err) => {
                    warn!(target: "scan::worker", batch = id, error = %err, "scan batch failed");
                    WorkerOutput::BatchPanicked {
                        id,
                        error: err.to_string(),
                    }
                }
            };
            if outputs.send(report).is_err() {
                break;
            }
        }
        debug!(target: "scan::worker", "scan worker stopped");
    }

    /// Scans every document of `batch`, reporting each outcome as it lands.
    pub async fn scan_batch(
        &self,
        batch: ScanBatch,
        outputs: &mpsc::UnboundedSender<WorkerOutput>,
        cancel: &CancellationToken,
    ) {
        debug!(target: "scan::worker", batch = batch.id, documents = batch.documents.len(), "scanning batch");
        stream::iter(batch.documents)
            .map(|document| self.scan_document(document, cancel))
            .buffer_unordered(self.concurrency)
            .for_each(|output| {
                if let Some(output) = output {
                    let _ = outputs.send(output);
                }
                futures::future::ready(())
            })
            .await;
    }

    async fn scan_document(
        &self,
        document: DocumentDescriptor,
        cancel: &CancellationToken,
    ) -> Option<WorkerOutput> {
        if cancel.is_cancelled() {
            return None;
        }
        let started_at = Utc::now();
        let timer = Instant::now();
        let content = match self.store.read(&document.path).await {
            Ok(content) => content,
            Err(err) => {
                warn!(target: "scan::worker", path = %document.path, error = %err, "failed to read document");
                return Some(WorkerOutput::Failed {
                    path: document.path,
                    error: err.to_string(),
                });
            }
        };
        let markup = String::from_utf8_lossy(&content);
        let fragments = dedup_fragments(self.extractor.extract(&document.path, &markup));
        let duration_ms = timer.elapsed().as_millis() as u64;
        debug!(
            target: "scan::worker",
            path = %document.path,
            assets = fragments.len(),
            duration_ms,
            "document scanned"
        );
        Some(WorkerOutput::Scanned(ScannedPage {
            checksum: checksum(&content),
            document,
            fragments,
            started_at,
            duration_ms,
        }))
    }
}
