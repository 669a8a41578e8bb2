//! Orchestration of one scanning session per content tree.

mod pending;
mod run;

pub use pending::PendingQueue;
pub use run::ScanOutcome;

use std::sync::Arc;

use mediadex_model::{PersistentStats, ScanStats, ScanType, SessionId};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::event_bus::InProcScanEventBus;
use crate::events::{ScanEvent, StopReason};
use crate::extract::Extractor;
use crate::state::StateStore;
use crate::store::ContentStore;
use run::{Control, RunContext, ScanRun};

/// Handle on the run loop of the current (or last) scan.
struct ActiveScan {
    control: mpsc::UnboundedSender<Control>,
    done: watch::Receiver<Option<ScanOutcome>>,
}

impl ActiveScan {
    fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }
}

/// Entry point for starting, observing and stopping scans of one content
/// tree on behalf of one client session.
pub struct QueueManager<S: ContentStore> {
    config: Arc<ScanConfig>,
    state: StateStore<S>,
    extractor: Arc<Extractor>,
    session: SessionId,
    bus: InProcScanEventBus,
    stats: Arc<watch::Sender<ScanStats>>,
    active: Mutex<Option<ActiveScan>>,
}

impl<S: ContentStore> std::fmt::Debug for QueueManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("session", &self.session)
            .field("state", &self.state)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl<S: ContentStore> QueueManager<S> {
    pub fn new(config: ScanConfig, store: Arc<S>, session: SessionId) -> Result<Self> {
        config.validate()?;
        let state = StateStore::new(store, &config);
        let extractor = Arc::new(Extractor::new(&config.content_hosts));
        let bus = InProcScanEventBus::new(config.event_channel_capacity);
        let (stats, _) = watch::channel(ScanStats::default());
        Ok(Self {
            config: Arc::new(config),
            state,
            extractor,
            session,
            bus,
            stats: Arc::new(stats),
            active: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> &StateStore<S> {
        &self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.bus.subscribe()
    }

    /// Starts an incremental scan, or a forced rescan of every document.
    pub async fn start_scan(&self, force_rescan: bool) -> Result<()> {
        self.start_scan_with(ScanType::from_force(force_rescan)).await
    }

    /// Acquires the lease and spawns the run loop.
    ///
    /// Fails with [`ScanError::AlreadyRunning`] if this manager is scanning
    /// and with [`ScanError::LeaseConflict`] if another live session holds
    /// the lease.
    pub async fn start_scan_with(&self, scan_type: ScanType) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|scan| !scan.is_finished()) {
            return Err(ScanError::AlreadyRunning);
        }

        self.state.acquire_lease(&self.session, scan_type).await?;
        self.stats.send_replace(ScanStats::default());

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(None);
        let run = ScanRun::new(RunContext {
            config: Arc::clone(&self.config),
            state: self.state.clone(),
            extractor: Arc::clone(&self.extractor),
            session: self.session.clone(),
            scan_type,
            bus: self.bus.clone(),
            stats: Arc::clone(&self.stats),
            cancel: CancellationToken::new(),
            control_tx: control_tx.clone(),
            control_rx,
            done: done_tx,
        });
        tokio::spawn(run.run());

        info!(target: "scan::queue", session = %self.session, %scan_type, "scan started");
        *active = Some(ActiveScan {
            control: control_tx,
            done: done_rx,
        });
        Ok(())
    }

    /// Stops the running scan, persisting the pending queue for resumption.
    pub async fn stop_scan(&self) -> Result<ScanOutcome> {
        self.stop_queue_scanning(true).await
    }

    /// Stops the running scan and waits for it to wind down. With
    /// `persist == false` the pending queue is discarded.
    pub async fn stop_queue_scanning(&self, persist: bool) -> Result<ScanOutcome> {
        let mut done = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(scan) if !scan.is_finished() => {
                    let _ = scan.control.send(Control::Stop { persist });
                    scan.done.clone()
                }
                _ => return Err(ScanError::NotRunning),
            }
        };
        Self::await_outcome(&mut done).await
    }

    /// Waits until the current scan stops on its own or is stopped.
    ///
    /// Maps a lost lease to [`ScanError::LeaseLost`] and an aborted scan to
    /// [`ScanError::Internal`].
    pub async fn wait_for_completion(&self) -> Result<ScanOutcome> {
        let mut done = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(scan) => scan.done.clone(),
                None => return Err(ScanError::NotRunning),
            }
        };
        let outcome = Self::await_outcome(&mut done).await?;
        match &outcome.reason {
            StopReason::LeaseLost => {
                let holder = self
                    .state
                    .current_lease()
                    .await?
                    .filter(|lease| lease.is_active)
                    .map(|lease| lease.session_id);
                Err(ScanError::LeaseLost { holder })
            }
            StopReason::Failed(reason) => Err(ScanError::Internal(reason.clone())),
            StopReason::Completed | StopReason::Stopped => Ok(outcome),
        }
    }

    async fn await_outcome(
        done: &mut watch::Receiver<Option<ScanOutcome>>,
    ) -> Result<ScanOutcome> {
        let outcome = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ScanError::Internal("scan run dropped".into()))?;
        outcome
            .clone()
            .ok_or_else(|| ScanError::Internal("scan outcome missing".into()))
    }

    pub async fn is_scan_active(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|scan| !scan.is_finished())
    }

    /// Live counters of the current (or last) scan.
    pub fn stats(&self) -> ScanStats {
        *self.stats.borrow()
    }

    pub fn watch_stats(&self) -> watch::Receiver<ScanStats> {
        self.stats.subscribe()
    }

    /// Live counters merged with what the state files record.
    pub async fn persistent_stats(&self) -> Result<PersistentStats> {
        let results = self.state.load_results().await?;
        let index = self.state.load_index().await?;
        let queue = self.state.load_queue().await?;
        let lease = self.state.current_lease().await?;
        Ok(PersistentStats {
            current: self.stats(),
            scanned_documents: results.len(),
            indexed_assets: index.len(),
            pending_queue: queue.len(),
            last_scanned_at: results.values().map(|r| r.last_scanned_at).max(),
            lease,
        })
    }
}
