use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use mediadex_model::{
    DocumentDescriptor, LeaseProgress, LeaseStatus, ScanResultRecord, ScanStats,
    ScanType, SessionId, needs_scan,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pending::PendingQueue;
use crate::config::ScanConfig;
use crate::discovery::DiscoveryCoordinator;
use crate::error::Result;
use crate::event_bus::InProcScanEventBus;
use crate::events::{ScanEvent, SkipReason, StopReason};
use crate::extract::Extractor;
use crate::index::AssetIndex;
use crate::state::{HeartbeatOutcome, ScanResults, StateStore};
use crate::store::ContentStore;
use crate::worker::{BatchId, ScanBatch, ScanWorker, ScannedPage, WorkerOutput};

/// Requests from the manager (or the heartbeat) to the run loop.
#[derive(Debug)]
pub(crate) enum Control {
    Stop { persist: bool },
    LeaseLost { holder: Option<SessionId> },
    HeartbeatFailed { error: String },
}

/// How a scanning session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOutcome {
    pub reason: StopReason,
    pub stats: ScanStats,
}

pub(crate) fn lease_progress(stats: &ScanStats) -> LeaseProgress {
    LeaseProgress {
        total_documents: stats.total_pages,
        scanned_documents: stats.scanned_pages,
        total_assets: stats.total_assets,
    }
}

/// Everything a run needs from its manager.
pub(crate) struct RunContext<S: ContentStore> {
    pub config: Arc<ScanConfig>,
    pub state: StateStore<S>,
    pub extractor: Arc<Extractor>,
    pub session: SessionId,
    pub scan_type: ScanType,
    pub bus: InProcScanEventBus,
    pub stats: Arc<watch::Sender<ScanStats>>,
    pub cancel: CancellationToken,
    pub control_tx: mpsc::UnboundedSender<Control>,
    pub control_rx: mpsc::UnboundedReceiver<Control>,
    pub done: watch::Sender<Option<ScanOutcome>>,
}

/// The coordinating task of one scanning session. Sole writer of the stats,
/// the in-memory queue, the results and the index.
pub(crate) struct ScanRun<S: ContentStore> {
    ctx: RunContext<S>,
    queue: PendingQueue,
    results: ScanResults,
    index: AssetIndex,
    current: ScanStats,
    seen: HashSet<String>,
    scanned: HashSet<String>,
    /// Scanned this session but not yet in a saved index and results. Stay
    /// in the persisted queue until then.
    uncommitted: Vec<DocumentDescriptor>,
    /// Set as soon as the heartbeat sees another holder. No state file is
    /// written afterwards.
    lease_lost: Arc<AtomicBool>,
    in_flight: HashMap<BatchId, Vec<String>>,
    next_batch: BatchId,
    discovery_done: bool,
    loaded: bool,
    dirty: bool,
    persisted_queue_len: usize,
    batches: Option<mpsc::UnboundedSender<ScanBatch>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl<S: ContentStore> ScanRun<S> {
    pub(crate) fn new(ctx: RunContext<S>) -> Self {
        Self {
            ctx,
            queue: PendingQueue::new(),
            results: ScanResults::new(),
            index: AssetIndex::new(),
            current: ScanStats::default(),
            seen: HashSet::new(),
            scanned: HashSet::new(),
            uncommitted: Vec::new(),
            lease_lost: Arc::new(AtomicBool::new(false)),
            in_flight: HashMap::new(),
            next_batch: 0,
            discovery_done: false,
            loaded: false,
            dirty: false,
            persisted_queue_len: 0,
            batches: None,
            heartbeat: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let (reason, persist) = match self.execute().await {
            Ok(end) => end,
            Err(err) => {
                error!(target: "scan::queue", session = %self.ctx.session, error = %err, "scan aborted");
                (StopReason::Failed(err.to_string()), true)
            }
        };
        self.finalize(reason, persist).await;
    }

    async fn execute(&mut self) -> Result<(StopReason, bool)> {
        self.load_state().await?;

        self.publish(ScanEvent::ScanningStarted {
            session_id: self.ctx.session.clone(),
            scan_type: self.ctx.scan_type,
        });
        if !self.queue.is_empty() {
            info!(target: "scan::queue", queue_size = self.queue.len(), "resuming from persisted queue");
            self.publish(ScanEvent::ResumingFromQueue {
                queue_size: self.queue.len(),
            });
        }

        let store = Arc::clone(self.ctx.state.store());
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let worker = ScanWorker::new(
            Arc::clone(&store),
            Arc::clone(&self.ctx.extractor),
            self.ctx.config.scan_concurrency,
        );
        tokio::spawn(worker.run(batch_rx, out_tx, self.ctx.cancel.clone()));
        self.batches = Some(batch_tx);

        let coordinator = DiscoveryCoordinator::new(store, &self.ctx.config);
        let discovery_cancel = self.ctx.cancel.clone();
        tokio::spawn(async move {
            coordinator.run(discovery_cancel, events_tx).await;
        });

        self.heartbeat = Some(self.spawn_heartbeat());

        let resumed = self.queue.documents();
        for document in &resumed {
            self.seen.insert(document.path.clone());
        }
        self.current.total_pages = self.seen.len();
        self.refresh_stats();
        self.dispatch(resumed);

        loop {
            if self.is_drained() {
                info!(target: "scan::queue", scanned = self.current.scanned_pages, errors = self.current.errors, "scan complete");
                return Ok((StopReason::Completed, false));
            }
            tokio::select! {
                biased;
                control = self.ctx.control_rx.recv() => match control {
                    Some(Control::Stop { persist }) => {
                        info!(target: "scan::queue", persist, "scan stop requested");
                        return Ok((StopReason::Stopped, persist));
                    }
                    Some(Control::LeaseLost { holder }) => {
                        self.lease_lost.store(true, Ordering::SeqCst);
                        warn!(target: "scan::lease", ?holder, "scan lease lost, stopping");
                        self.publish(ScanEvent::LeaseLost { holder });
                        return Ok((StopReason::LeaseLost, true));
                    }
                    Some(Control::HeartbeatFailed { error }) => {
                        let path = self.ctx.state.paths().lease.clone();
                        self.state_write_failed(path, error);
                    }
                    None => return Ok((StopReason::Stopped, true)),
                },
                output = out_rx.recv() => match output {
                    Some(output) => self.on_worker_output(output).await,
                    None => {
                        return Ok((
                            StopReason::Failed("scan worker exited".into()),
                            true,
                        ));
                    }
                },
                event = events_rx.recv(), if !self.discovery_done => match event {
                    Some(event) => self.on_discovery_event(event).await,
                    None => {
                        debug!(target: "scan::queue", "discovery channel closed");
                        self.discovery_done = true;
                    }
                },
            }
        }
    }

    async fn load_state(&mut self) -> Result<()> {
        let state = &self.ctx.state;
        match self.ctx.scan_type {
            ScanType::Full => {
                state.clear_history().await?;
                state.save_queue(&[]).await?;
            }
            ScanType::Force => {
                self.results = state.load_results().await?;
                self.index = state.load_index().await?;
                state.save_queue(&[]).await?;
            }
            ScanType::Incremental => {
                self.results = state.load_results().await?;
                self.index = state.load_index().await?;
                self.queue = PendingQueue::from_documents(state.load_queue().await?);
                self.persisted_queue_len = self.queue.len();
            }
        }
        self.loaded = true;
        Ok(())
    }

    fn is_drained(&self) -> bool {
        self.discovery_done && self.queue.is_empty() && self.in_flight.is_empty()
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let state = self.ctx.state.clone();
        let session = self.ctx.session.clone();
        let stats = self.ctx.stats.subscribe();
        let control = self.ctx.control_tx.clone();
        let cancel = self.ctx.cancel.clone();
        let period = self.ctx.config.lease.heartbeat_interval();
        let lease_lost = Arc::clone(&self.lease_lost);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let progress = lease_progress(&stats.borrow());
                match state.heartbeat(&session, progress).await {
                    Ok(HeartbeatOutcome::Renewed) => {}
                    Ok(HeartbeatOutcome::Lost { holder }) => {
                        lease_lost.store(true, Ordering::SeqCst);
                        let _ = control.send(Control::LeaseLost { holder });
                        break;
                    }
                    Err(err) => {
                        debug!(target: "scan::lease", session = %session, error = %err, "heartbeat failed");
                        let _ = control.send(Control::HeartbeatFailed {
                            error: err.to_string(),
                        });
                    }
                }
            }
        })
    }

    fn publish(&mut self, event: ScanEvent) {
        if event.is_error() {
            self.current.errors += 1;
            self.refresh_stats();
        }
        self.ctx.bus.publish(event);
    }

    fn refresh_stats(&mut self) {
        self.current.queued_pages = self.queue.len();
        self.current.total_assets = self.index.len();
        self.ctx.stats.send_replace(self.current);
    }

    fn dispatch(&mut self, documents: Vec<DocumentDescriptor>) {
        let Some(batches) = self.batches.as_ref() else {
            return;
        };
        for chunk in documents.chunks(self.ctx.config.scan_batch_size.max(1)) {
            let id = self.next_batch;
            self.next_batch += 1;
            let paths = chunk.iter().map(|d| d.path.clone()).collect();
            let batch = ScanBatch {
                id,
                documents: chunk.to_vec(),
            };
            if batches.send(batch).is_err() {
                warn!(target: "scan::queue", batch = id, "scan worker gone, batch not dispatched");
                continue;
            }
            self.in_flight.insert(id, paths);
        }
    }

    async fn on_discovery_event(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::FolderProgress {
                folder,
                documents,
                total_found,
            } => {
                self.publish(ScanEvent::FolderProgress {
                    folder,
                    documents: documents.clone(),
                    total_found,
                });
                self.enqueue(documents).await;
            }
            ScanEvent::DocumentsDiscovered { documents } => {
                self.publish(ScanEvent::DocumentsDiscovered {
                    documents: documents.clone(),
                });
                self.enqueue(documents).await;
            }
            ScanEvent::DiscoveryComplete { total_documents } => {
                info!(target: "scan::queue", total_documents, "discovery finished");
                self.discovery_done = true;
                self.publish(ScanEvent::DiscoveryComplete { total_documents });
            }
            other => self.publish(other),
        }
    }

    /// Filters a discovery batch through the inclusion rule, persists the
    /// survivors and dispatches them.
    async fn enqueue(&mut self, documents: Vec<DocumentDescriptor>) {
        let ignore_history = self.ctx.scan_type.ignores_history();
        let mut accepted = Vec::new();
        let mut already_scanned = Vec::new();
        let mut already_queued = Vec::new();

        for document in documents {
            self.seen.insert(document.path.clone());
            if self.queue.contains(&document.path) {
                self.queue.push(document.clone());
                already_queued.push(document.path);
                continue;
            }
            if self.scanned.contains(&document.path)
                || !needs_scan(
                    &document,
                    self.results.get(&document.path),
                    ignore_history,
                )
            {
                already_scanned.push(document.path);
                continue;
            }
            accepted.push(document);
        }
        self.current.total_pages = self.seen.len();

        for (documents, reason) in [
            (already_scanned, SkipReason::AlreadyScanned),
            (already_queued, SkipReason::AlreadyQueued),
        ] {
            if !documents.is_empty() {
                debug!(target: "scan::queue", count = documents.len(), ?reason, "documents skipped");
                self.publish(ScanEvent::DocumentsSkipped {
                    count: documents.len(),
                    documents,
                    reason,
                });
            }
        }

        if accepted.is_empty() {
            self.refresh_stats();
            return;
        }
        for document in &accepted {
            self.queue.push(document.clone());
        }
        self.persist_queue().await;
        self.refresh_stats();
        self.dispatch(accepted);
    }

    async fn on_worker_output(&mut self, output: WorkerOutput) {
        match output {
            WorkerOutput::Scanned(page) => self.on_scanned(page),
            WorkerOutput::Failed { path, error } => {
                self.publish(ScanEvent::PageScanError {
                    page: path.clone(),
                    error,
                });
                self.queue.remove(&path);
                self.dirty = true;
                self.refresh_stats();
            }
            WorkerOutput::BatchFinished { id } => {
                self.in_flight.remove(&id);
                self.checkpoint().await;
            }
            WorkerOutput::BatchPanicked { id, error } => {
                self.publish(ScanEvent::WorkerError { error });
                // Unreported documents fall out of this pass; the inclusion
                // rule picks them up next time.
                for path in self.in_flight.remove(&id).unwrap_or_default() {
                    if self.queue.remove(&path).is_some() {
                        self.dirty = true;
                    }
                }
                self.refresh_stats();
                self.checkpoint().await;
            }
        }
    }

    fn on_scanned(&mut self, page: ScannedPage) {
        let path = page.document.path.clone();
        self.current.scanned_pages += 1;
        self.publish(ScanEvent::PageScanned {
            path: path.clone(),
            asset_count: page.fragments.len(),
            assets: page.fragments.clone(),
            scan_duration_ms: page.duration_ms,
        });

        // The page leaves the persisted queue only at the next checkpoint,
        // after index and results are saved.
        self.index.merge(&path, &page.fragments, Utc::now());
        self.results.insert(
            path.clone(),
            ScanResultRecord {
                path: path.clone(),
                last_scanned_at: page.started_at,
                asset_count: page.fragments.len(),
                assets: page.fragments,
                checksum: Some(page.checksum),
                scan_duration_ms: page.duration_ms,
            },
        );
        let document = self.queue.remove(&path).unwrap_or(page.document);
        self.uncommitted.push(document);
        self.scanned.insert(path);
        self.dirty = true;
        self.refresh_stats();
    }

    /// Writes the queue and reports a changed length. Pages scanned since
    /// the last checkpoint are written too, so a crash rescans them.
    async fn persist_queue(&mut self) {
        if self.lease_lost.load(Ordering::SeqCst) {
            return;
        }
        let mut documents = self.uncommitted.clone();
        documents.extend(self.queue.documents());
        if let Err(err) = self.ctx.state.save_queue(&documents).await {
            let path = self.ctx.state.paths().queue.clone();
            self.state_write_failed(path, err.to_string());
            return;
        }
        if documents.len() != self.persisted_queue_len {
            self.persisted_queue_len = documents.len();
            self.publish(ScanEvent::QueueSizeUpdate {
                queue_size: documents.len(),
            });
        }
    }

    /// Flushes index, results and queue, in that order.
    async fn checkpoint(&mut self) {
        if !self.dirty || self.lease_lost.load(Ordering::SeqCst) {
            return;
        }
        let state = self.ctx.state.clone();
        if let Err(err) = state.save_index(&self.index).await {
            self.state_write_failed(state.paths().index.clone(), err.to_string());
            return;
        }
        if let Err(err) = state.save_results(&self.results).await {
            self.state_write_failed(state.paths().results.clone(), err.to_string());
            return;
        }
        self.uncommitted.clear();
        self.persist_queue().await;
        self.dirty = false;
        self.refresh_stats();
    }

    fn state_write_failed(&mut self, path: String, error: String) {
        error!(target: "scan::store", path = %path, error = %error, "state write failed");
        self.publish(ScanEvent::StateWriteError { path, error });
    }

    async fn finalize(mut self, mut reason: StopReason, persist: bool) {
        self.ctx.cancel.cancel();
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        self.batches = None;

        if reason == StopReason::LeaseLost {
            self.lease_lost.store(true, Ordering::SeqCst);
        } else if self.lease_lost.load(Ordering::SeqCst) {
            // The heartbeat lost the lease while the loop was finishing.
            while let Ok(control) = self.ctx.control_rx.try_recv() {
                if let Control::LeaseLost { holder } = control {
                    warn!(target: "scan::lease", ?holder, "scan lease lost while stopping");
                    self.publish(ScanEvent::LeaseLost { holder });
                    break;
                }
            }
            reason = StopReason::LeaseLost;
        }

        if self.loaded {
            if !persist {
                self.queue.clear();
            }
            self.dirty = true;
            self.checkpoint().await;
        }

        if !self.lease_lost.load(Ordering::SeqCst) {
            let status = match reason {
                StopReason::Failed(_) => LeaseStatus::Error,
                _ => LeaseStatus::Completed,
            };
            let progress = lease_progress(&self.current);
            if let Err(err) = self
                .ctx
                .state
                .release_lease(&self.ctx.session, status, progress)
                .await
            {
                let path = self.ctx.state.paths().lease.clone();
                self.state_write_failed(path, err.to_string());
            }
        }

        let stats = self.current;
        info!(
            target: "scan::queue",
            session = %self.ctx.session,
            ?reason,
            scanned = stats.scanned_pages,
            queued = stats.queued_pages,
            assets = stats.total_assets,
            errors = stats.errors,
            "scanning stopped"
        );
        self.publish(ScanEvent::ScanningStopped {
            reason: reason.clone(),
            stats,
        });
        self.ctx.done.send_replace(Some(ScanOutcome { reason, stats }));
    }
}
