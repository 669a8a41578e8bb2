use std::sync::Arc;

use anyhow::Context;
use mediadex_core::{
    ContentStore, QueueManager, ScanConfig, ScanEvent, StateStore,
};
use mediadex_model::{ScanType, SessionId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{Command, LeaseCommand, ScanArgs};

pub async fn run<S: ContentStore>(
    command: Command,
    store: Arc<S>,
    config: ScanConfig,
) -> anyhow::Result<()> {
    match command {
        Command::Scan(args) => scan(args, store, config).await,
        Command::Stats => {
            let manager = QueueManager::new(config, store, SessionId::new())?;
            let stats = manager.persistent_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Status => {
            let state = StateStore::new(store, &config);
            match state.current_lease().await? {
                Some(lease) => println!("{}", serde_json::to_string_pretty(&lease)?),
                None => println!("no scan lease recorded"),
            }
            Ok(())
        }
        Command::Lease(LeaseCommand::Clear { force }) => {
            let state = StateStore::new(store, &config);
            match state
                .clear_lease(force)
                .await
                .context("lease is held by a live session; pass --force to clear it anyway")?
            {
                Some(previous) => {
                    info!(target: "mediadexctl", holder = %previous.session_id, "scan lease cleared");
                    println!("{}", serde_json::to_string_pretty(&previous)?);
                }
                None => println!("no scan lease recorded"),
            }
            Ok(())
        }
    }
}

async fn scan<S: ContentStore>(
    args: ScanArgs,
    store: Arc<S>,
    config: ScanConfig,
) -> anyhow::Result<()> {
    let scan_type = if args.full {
        ScanType::Full
    } else {
        ScanType::from_force(args.force)
    };
    let manager = QueueManager::new(config, store, SessionId::new())?;
    let mut events = manager.subscribe();
    manager
        .start_scan_with(scan_type)
        .await
        .context("failed to start scan")?;

    let completion = manager.wait_for_completion();
    tokio::pin!(completion);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    let outcome = loop {
        tokio::select! {
            result = &mut completion => break result?,
            _ = &mut ctrl_c, if !stopping => {
                stopping = true;
                info!(target: "mediadexctl", "stopping scan, pending documents stay queued");
                manager.stop_scan().await?;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "mediadexctl", skipped, "event log fell behind");
                }
                Err(RecvError::Closed) => {}
            },
        }
    };

    // Whatever the bus still holds arrived before the outcome.
    while let Ok(event) = events.try_recv() {
        log_event(&event);
    }
    info!(target: "mediadexctl", reason = ?outcome.reason, "scan finished");
    println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
    Ok(())
}

fn log_event(event: &ScanEvent) {
    match event {
        ScanEvent::PageScanned {
            path,
            asset_count,
            scan_duration_ms,
            ..
        } => {
            info!(target: "mediadexctl", path = %path, assets = asset_count, duration_ms = scan_duration_ms, "page scanned");
        }
        ScanEvent::DiscoveryComplete { total_documents } => {
            info!(target: "mediadexctl", total_documents, "discovery complete");
        }
        ScanEvent::ResumingFromQueue { queue_size } => {
            info!(target: "mediadexctl", queue_size, "resuming persisted queue");
        }
        ScanEvent::LeaseLost { holder } => {
            warn!(target: "mediadexctl", ?holder, "scan lease taken over");
        }
        event if event.is_error() => {
            warn!(target: "mediadexctl", kind = event.kind(), ?event, "scan error");
        }
        event => debug!(target: "mediadexctl", kind = event.kind(), "scan event"),
    }
}
