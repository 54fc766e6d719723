//! Folder listing cache
//!
//! The refresh engine keeps the cached tree fresh and durable. Listings are
//! only fetched when a folder is stale (or a refresh is forced), and every
//! successful listing is written through to the snapshot.

pub mod errors;
pub mod refresh;
pub mod snapshot;

pub use errors::CacheError;
pub use refresh::{DeepRefresh, Engine, RefreshOutcome};
pub use snapshot::SnapshotStore;
