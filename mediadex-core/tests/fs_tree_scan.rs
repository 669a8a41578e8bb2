use std::sync::Arc;

use mediadex_core::state::STATE_VERSION;
use mediadex_core::{ContentStore, FsContentStore, QueueManager, StopReason};
use mediadex_model::SessionId;
use tempfile::TempDir;

#[path = "support/mod.rs"]
mod support;

use support::{page_with_image, test_config};

async fn seed(store: &FsContentStore) {
    for path in ["/index.html", "/docs/guide.html", "/docs/deep/faq.html"] {
        let name = path.trim_start_matches('/').replace(['/', '.'], "-");
        store
            .write(path, page_with_image(&name).as_bytes())
            .await
            .unwrap();
    }
    store
        .write("/docs/manual.pdf", b"%PDF-1.7")
        .await
        .unwrap();
}

#[tokio::test]
async fn scans_a_local_tree_and_writes_state_files() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FsContentStore::new(tmp.path()));
    seed(&store).await;

    let manager = QueueManager::new(test_config(), Arc::clone(&store), SessionId::new()).unwrap();
    manager.start_scan(false).await.unwrap();
    let outcome = manager.wait_for_completion().await.unwrap();
    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(outcome.stats.scanned_pages, 3);

    let state_dir = tmp.path().join(".mediadex");
    for file in [
        "scan-lease.json",
        "discovery-queue.json",
        "scan-results.json",
        "asset-index.json",
    ] {
        let raw = std::fs::read(state_dir.join(file)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["version"], STATE_VERSION, "{file}");
    }

    let index: serde_json::Value = serde_json::from_slice(
        &std::fs::read(state_dir.join("asset-index.json")).unwrap(),
    )
    .unwrap();
    let records = index["data"].as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|record| record["type"] == "image"));
}

#[tokio::test]
async fn second_pass_over_unchanged_tree_scans_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FsContentStore::new(tmp.path()));
    seed(&store).await;

    let first = QueueManager::new(test_config(), Arc::clone(&store), SessionId::new()).unwrap();
    first.start_scan(false).await.unwrap();
    first.wait_for_completion().await.unwrap();

    let second = QueueManager::new(test_config(), Arc::clone(&store), SessionId::new()).unwrap();
    second.start_scan(false).await.unwrap();
    let outcome = second.wait_for_completion().await.unwrap();
    assert_eq!(outcome.stats.scanned_pages, 0);
    assert_eq!(outcome.stats.total_pages, 3);
    assert_eq!(outcome.stats.total_assets, 3);
}
