//! Shared fixtures for the scan integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mediadex_core::{MemoryContentStore, QueueManager, ScanConfig, ScanEvent};
use mediadex_model::SessionId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Upper bound on how long a test waits for a single event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Config with small batches so tests can observe individual steps.
pub fn test_config() -> ScanConfig {
    ScanConfig {
        max_discovery_concurrency: 2,
        scan_batch_size: 2,
        scan_concurrency: 2,
        ..ScanConfig::default()
    }
}

/// Markup referencing a single image named after the document.
pub fn page_with_image(name: &str) -> String {
    format!(r#"<html><body><img src="/img/{name}.png" alt="{name}"></body></html>"#)
}

/// Inserts `paths` with a modification time in the past, each referencing
/// its own image.
pub async fn seed_pages(store: &MemoryContentStore, paths: &[&str]) {
    let modified = Utc::now() - chrono::Duration::hours(1);
    for path in paths {
        let name = path.trim_start_matches('/').replace(['/', '.'], "-");
        store
            .insert_with_modified(path, page_with_image(&name), modified)
            .await;
    }
}

pub fn manager(
    store: &Arc<MemoryContentStore>,
    config: ScanConfig,
) -> QueueManager<MemoryContentStore> {
    QueueManager::new(config, Arc::clone(store), SessionId::new())
        .expect("valid scan config")
}

/// Receives events until `pred` matches, returning the match.
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<ScanEvent>,
    mut pred: F,
) -> ScanEvent
where
    F: FnMut(&ScanEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("expected event was not emitted")
}

/// Drains every event published so far.
pub fn drain(events: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return seen,
        }
    }
}
