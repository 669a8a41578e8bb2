//! # Mediadex Core
//!
//! Core library of mediadex: walks a content tree of markup documents,
//! extracts every media reference they contain and maintains a deduplicated
//! asset index inside the tree itself.
//!
//! ## Overview
//!
//! - **Content stores**: [`store::ContentStore`] abstracts a remote HTTP
//!   tree, a local folder or an in-memory tree
//! - **Durable state**: lease, pending queue, scan results and the asset
//!   index live as versioned JSON files under the state folder
//! - **Discovery**: folders are walked in parallel, documents are reported
//!   in batches as they are found
//! - **Scanning**: the [`queue::QueueManager`] filters discoveries through
//!   the inclusion rule, dispatches batches to the scan worker and merges
//!   the results into the index
//! - **Coordination**: a heartbeat-renewed lease keeps concurrent sessions
//!   from scanning the same tree
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mediadex_core::{MemoryContentStore, QueueManager, ScanConfig};
//! use mediadex_model::SessionId;
//!
//! async fn scan() -> mediadex_core::Result<()> {
//!     let store = Arc::new(MemoryContentStore::new());
//!     store.insert("/index.html", r#"<img src="/logo.png">"#).await;
//!
//!     let manager = QueueManager::new(ScanConfig::default(), store, SessionId::new())?;
//!     manager.start_scan(false).await?;
//!     let outcome = manager.wait_for_completion().await?;
//!     println!("scanned {} pages", outcome.stats.scanned_pages);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Scan settings and their defaults
pub mod config;

/// Parallel folder walk producing document descriptors
pub mod discovery;

/// Error types shared across the crate
pub mod error;

/// Broadcast fan-out of scan events
pub mod event_bus;

/// Events emitted over the lifetime of a scan
pub mod events;

/// Media reference extraction from markup
pub mod extract;

/// The deduplicated asset index
pub mod index;

/// Scan orchestration: queue, lease upkeep and checkpoints
pub mod queue;

/// Typed access to the state files kept in the content tree
pub mod state;

/// Content store abstraction and its implementations
pub mod store;

/// Batch scanning of documents
pub mod worker;

pub use config::{LeaseConfig, RetryConfig, ScanConfig};
pub use error::{Result, ScanError, StoreError};
pub use event_bus::InProcScanEventBus;
pub use events::{ScanEvent, SkipReason, StopReason};
pub use extract::Extractor;
pub use index::AssetIndex;
pub use queue::{QueueManager, ScanOutcome};
pub use state::StateStore;
pub use store::{
    ContentStore, FsContentStore, HttpContentStore, MemoryContentStore,
    StoreEntry,
};
