//! Durable scan state kept inside the content tree: the lease, the pending
//! discovery queue, per-document scan results and the asset index.

mod files;
mod retry;

pub use files::{
    INDEX_FILE, LEASE_FILE, QUEUE_FILE, RESULTS_FILE, STATE_VERSION, StateFile,
    StatePaths,
};
pub use retry::{jittered_delay_ms, with_retry};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use mediadex_model::{
    DocumentDescriptor, LeaseProgress, LeaseStatus, ScanLease,
    ScanResultRecord, ScanType, SessionId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{LeaseConfig, RetryConfig, ScanConfig};
use crate::error::{Result, ScanError};
use crate::index::AssetIndex;
use crate::store::ContentStore;
use files::StateHeader;

/// Scan results keyed by document path.
pub type ScanResults = BTreeMap<String, ScanResultRecord>;

/// Result of one heartbeat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Renewed,
    /// The lease no longer belongs to this session. `holder` is the new
    /// owner, or `None` if the lease was cleared.
    Lost { holder: Option<SessionId> },
}

/// A decoded state file together with the raw bytes it was decoded from,
/// for compare-and-write.
struct Snapshot<T> {
    raw: Vec<u8>,
    file: StateFile<T>,
}

/// Typed access to the state files of one content tree.
pub struct StateStore<S: ContentStore> {
    store: Arc<S>,
    paths: StatePaths,
    lease: LeaseConfig,
    retry: RetryConfig,
}

impl<S: ContentStore> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            paths: self.paths.clone(),
            lease: self.lease,
            retry: self.retry,
        }
    }
}

impl<S: ContentStore> std::fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("paths", &self.paths)
            .field("lease", &self.lease)
            .finish()
    }
}

impl<S: ContentStore> StateStore<S> {
    pub fn new(store: Arc<S>, config: &ScanConfig) -> Self {
        Self {
            store,
            paths: StatePaths::new(&config.state_folder),
            lease: config.lease,
            retry: config.retry,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    async fn read_snapshot<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<Snapshot<T>>> {
        let Some(raw) = self.store.read_optional(path).await? else {
            return Ok(None);
        };
        let header: StateHeader = serde_json::from_slice(&raw)?;
        if header.version == 0 || header.version > STATE_VERSION {
            return Err(ScanError::UnsupportedStateVersion {
                file: path.to_string(),
                version: header.version,
            });
        }
        let file: StateFile<T> = serde_json::from_slice(&raw)?;
        Ok(Some(Snapshot { raw, file }))
    }

    async fn read_data<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>> {
        let snapshot = with_retry(&self.retry, "read_state", || {
            self.read_snapshot::<T>(path)
        })
        .await?;
        Ok(snapshot.map(|snapshot| snapshot.file.data))
    }

    async fn write_data<T: Serialize>(&self, path: &str, data: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&StateFile::new(data))?;
        let payload = bytes.as_slice();
        with_retry(&self.retry, "write_state", move || async move {
            self.store.write(path, payload).await.map_err(ScanError::from)
        })
        .await?;
        debug!(target: "scan::store", path = %path, bytes = bytes.len(), "state file written");
        Ok(())
    }

    // ---- lease -----------------------------------------------------------

    pub async fn current_lease(&self) -> Result<Option<ScanLease>> {
        self.read_data(&self.paths.lease).await
    }

    /// Takes the tree-wide lease for `session`.
    ///
    /// Fails with [`ScanError::LeaseConflict`] while another session holds a
    /// live lease. An abandoned lease is reclaimed.
    pub async fn acquire_lease(
        &self,
        session: &SessionId,
        scan_type: ScanType,
    ) -> Result<ScanLease> {
        let now = Utc::now();
        let current = self.read_snapshot::<ScanLease>(&self.paths.lease).await?;

        if let Some(snapshot) = &current {
            let held = &snapshot.file.data;
            if held.blocks(session, now, self.lease.timeout()) {
                return Err(ScanError::LeaseConflict {
                    session_id: held.session_id.clone(),
                    last_heartbeat_at: held.last_heartbeat_at,
                });
            }
            if held.is_active && &held.session_id != session {
                warn!(
                    target: "scan::lease",
                    holder = %held.session_id,
                    last_heartbeat_at = %held.last_heartbeat_at,
                    session = %session,
                    "reclaiming abandoned scan lease"
                );
            }
        }

        let lease = ScanLease::acquire(session.clone(), scan_type, now);
        let bytes = serde_json::to_vec_pretty(&StateFile::new(&lease))?;
        let expected = current.as_ref().map(|snapshot| snapshot.raw.as_slice());
        let written = self
            .store
            .compare_and_write(&self.paths.lease, expected, &bytes)
            .await?;
        if !written {
            // Another session wrote the lease between our read and write.
            return match self.current_lease().await? {
                Some(winner) if &winner.session_id != session => {
                    Err(ScanError::LeaseConflict {
                        session_id: winner.session_id,
                        last_heartbeat_at: winner.last_heartbeat_at,
                    })
                }
                _ => Err(ScanError::Internal(
                    "scan lease changed concurrently".into(),
                )),
            };
        }

        info!(target: "scan::lease", session = %session, scan_type = %scan_type, "scan lease acquired");
        Ok(lease)
    }

    /// Renews the lease of `session` and records progress.
    pub async fn heartbeat(
        &self,
        session: &SessionId,
        progress: LeaseProgress,
    ) -> Result<HeartbeatOutcome> {
        with_retry(&self.retry, "heartbeat", || {
            self.try_heartbeat(session, progress)
        })
        .await
    }

    async fn try_heartbeat(
        &self,
        session: &SessionId,
        progress: LeaseProgress,
    ) -> Result<HeartbeatOutcome> {
        let Some(snapshot) =
            self.read_snapshot::<ScanLease>(&self.paths.lease).await?
        else {
            return Ok(HeartbeatOutcome::Lost { holder: None });
        };
        let mut lease = snapshot.file.data;
        if &lease.session_id != session {
            return Ok(HeartbeatOutcome::Lost {
                holder: Some(lease.session_id),
            });
        }
        if !lease.is_active {
            return Ok(HeartbeatOutcome::Lost { holder: None });
        }

        lease.last_heartbeat_at = Utc::now();
        lease.progress = progress;
        let bytes = serde_json::to_vec_pretty(&StateFile::new(&lease))?;
        if self
            .store
            .compare_and_write(&self.paths.lease, Some(&snapshot.raw), &bytes)
            .await?
        {
            debug!(target: "scan::lease", session = %session, "heartbeat");
            return Ok(HeartbeatOutcome::Renewed);
        }

        let holder = self.current_lease().await?.map(|lease| lease.session_id);
        if holder.as_ref() == Some(session) {
            // Lost a race against our own earlier write; the lease is ours.
            return Ok(HeartbeatOutcome::Renewed);
        }
        Ok(HeartbeatOutcome::Lost { holder })
    }

    /// Marks the lease of `session` inactive. Returns `false` if the lease
    /// belongs to someone else and was left untouched.
    pub async fn release_lease(
        &self,
        session: &SessionId,
        status: LeaseStatus,
        progress: LeaseProgress,
    ) -> Result<bool> {
        with_retry(&self.retry, "release_lease", move || async move {
            let Some(snapshot) =
                self.read_snapshot::<ScanLease>(&self.paths.lease).await?
            else {
                return Ok(false);
            };
            let mut lease = snapshot.file.data;
            if &lease.session_id != session {
                return Ok(false);
            }
            lease.release(status, Utc::now());
            lease.progress = progress;
            let bytes = serde_json::to_vec_pretty(&StateFile::new(&lease))?;
            let written = self
                .store
                .compare_and_write(&self.paths.lease, Some(&snapshot.raw), &bytes)
                .await?;
            if written {
                info!(target: "scan::lease", session = %session, ?status, "scan lease released");
            }
            Ok(written)
        })
        .await
    }

    /// Deactivates the current lease regardless of owner.
    ///
    /// Without `force` only an abandoned (or already inactive) lease is
    /// cleared; a live lease yields [`ScanError::LeaseConflict`].
    pub async fn clear_lease(&self, force: bool) -> Result<Option<ScanLease>> {
        let Some(snapshot) =
            self.read_snapshot::<ScanLease>(&self.paths.lease).await?
        else {
            return Ok(None);
        };
        let previous = snapshot.file.data;
        let now = Utc::now();
        if previous.is_active
            && !previous.is_abandoned(now, self.lease.timeout())
            && !force
        {
            return Err(ScanError::LeaseConflict {
                session_id: previous.session_id,
                last_heartbeat_at: previous.last_heartbeat_at,
            });
        }

        let mut cleared = previous.clone();
        if cleared.is_active {
            cleared.release(LeaseStatus::Error, now);
        }
        let bytes = serde_json::to_vec_pretty(&StateFile::new(&cleared))?;
        if !self
            .store
            .compare_and_write(&self.paths.lease, Some(&snapshot.raw), &bytes)
            .await?
        {
            return Err(ScanError::Internal(
                "scan lease changed while clearing".into(),
            ));
        }
        warn!(target: "scan::lease", holder = %previous.session_id, force, "scan lease cleared");
        Ok(Some(previous))
    }

    // ---- queue, results, index --------------------------------------------

    pub async fn load_queue(&self) -> Result<Vec<DocumentDescriptor>> {
        Ok(self.read_data(&self.paths.queue).await?.unwrap_or_default())
    }

    pub async fn save_queue(&self, documents: &[DocumentDescriptor]) -> Result<()> {
        self.write_data(&self.paths.queue, &documents).await
    }

    pub async fn load_results(&self) -> Result<ScanResults> {
        Ok(self.read_data(&self.paths.results).await?.unwrap_or_default())
    }

    pub async fn save_results(&self, results: &ScanResults) -> Result<()> {
        self.write_data(&self.paths.results, results).await
    }

    pub async fn load_index(&self) -> Result<AssetIndex> {
        Ok(self.read_data(&self.paths.index).await?.unwrap_or_default())
    }

    pub async fn save_index(&self, index: &AssetIndex) -> Result<()> {
        self.write_data(&self.paths.index, index).await
    }

    /// Drops all scan results and the asset index ahead of a full reindex.
    pub async fn clear_history(&self) -> Result<()> {
        self.save_index(&AssetIndex::new()).await?;
        self.save_results(&ScanResults::new()).await?;
        info!(target: "scan::queue", "scan history cleared for full reindex");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::MemoryContentStore;

    fn state(store: &MemoryContentStore) -> StateStore<MemoryContentStore> {
        StateStore::new(Arc::new(store.clone()), &ScanConfig::default())
    }

    #[tokio::test]
    async fn second_session_conflicts_with_live_lease() {
        let store = MemoryContentStore::new();
        let state = state(&store);
        let a = SessionId::new();
        let b = SessionId::new();

        state.acquire_lease(&a, ScanType::Incremental).await.unwrap();
        let err = state.acquire_lease(&b, ScanType::Force).await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::LeaseConflict { session_id, .. } if session_id == a
        ));
    }

    #[tokio::test]
    async fn abandoned_lease_is_reclaimed() {
        let store = MemoryContentStore::new();
        let state = state(&store);
        let stale = SessionId::new();
        let mut lease = ScanLease::acquire(
            stale.clone(),
            ScanType::Incremental,
            Utc::now() - Duration::minutes(10),
        );
        lease.last_heartbeat_at = Utc::now() - Duration::minutes(6);
        state.write_data(&state.paths.lease, &lease).await.unwrap();

        let fresh = SessionId::new();
        let acquired =
            state.acquire_lease(&fresh, ScanType::Incremental).await.unwrap();
        assert_eq!(acquired.session_id, fresh);
        assert_eq!(
            state.heartbeat(&stale, LeaseProgress::default()).await.unwrap(),
            HeartbeatOutcome::Lost {
                holder: Some(fresh.clone())
            }
        );
    }

    #[tokio::test]
    async fn heartbeat_renews_and_release_deactivates() {
        let store = MemoryContentStore::new();
        let state = state(&store);
        let session = SessionId::new();
        state.acquire_lease(&session, ScanType::Incremental).await.unwrap();

        let progress = LeaseProgress {
            total_documents: 4,
            scanned_documents: 2,
            total_assets: 9,
        };
        assert_eq!(
            state.heartbeat(&session, progress).await.unwrap(),
            HeartbeatOutcome::Renewed
        );
        assert_eq!(state.current_lease().await.unwrap().unwrap().progress, progress);

        assert!(
            state
                .release_lease(&session, LeaseStatus::Completed, progress)
                .await
                .unwrap()
        );
        let lease = state.current_lease().await.unwrap().unwrap();
        assert!(!lease.is_active);
        assert_eq!(lease.status, LeaseStatus::Completed);

        // Released leases do not block anyone.
        state.acquire_lease(&SessionId::new(), ScanType::Force).await.unwrap();
    }

    #[tokio::test]
    async fn clear_requires_force_for_live_lease() {
        let store = MemoryContentStore::new();
        let state = state(&store);
        let session = SessionId::new();
        state.acquire_lease(&session, ScanType::Incremental).await.unwrap();

        assert!(state.clear_lease(false).await.unwrap_err().is_conflict());
        let previous = state.clear_lease(true).await.unwrap().unwrap();
        assert_eq!(previous.session_id, session);
        assert_eq!(
            state.heartbeat(&session, LeaseProgress::default()).await.unwrap(),
            HeartbeatOutcome::Lost { holder: None }
        );
    }

    #[tokio::test]
    async fn future_schema_versions_are_rejected() {
        let store = MemoryContentStore::new();
        store
            .insert(
                "/.mediadex/discovery-queue.json",
                r#"{"version": 99, "updatedAt": "2024-01-01T00:00:00Z", "data": []}"#,
            )
            .await;
        let err = state(&store).load_queue().await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::UnsupportedStateVersion { version: 99, .. }
        ));
    }

    #[tokio::test]
    async fn missing_files_load_as_empty() {
        let store = MemoryContentStore::new();
        let state = state(&store);
        assert!(state.load_queue().await.unwrap().is_empty());
        assert!(state.load_results().await.unwrap().is_empty());
        assert!(state.load_index().await.unwrap().is_empty());
        assert!(state.current_lease().await.unwrap().is_none());
    }
}
