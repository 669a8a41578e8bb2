//! Data model shared by the mediadex crates: documents, asset records, scan
//! results, the scan lease and statistics.

pub mod asset;
pub mod document;
pub mod error;
pub mod ids;
pub mod scan;
pub mod stats;

pub use asset::{
    AssetContext, AssetFragment, AssetRecord, AssetType, Dimensions,
    media_extension,
};
pub use document::DocumentDescriptor;
pub use error::{ModelError, Result as ModelResult};
pub use ids::SessionId;
pub use scan::{
    LeaseProgress, LeaseStatus, ScanLease, ScanResultRecord, ScanType,
    needs_scan,
};
pub use stats::{PersistentStats, ScanStats};
