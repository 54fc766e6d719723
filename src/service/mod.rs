//! Refresh service
//!
//! Runs the engine on its own thread and feeds it requests one at a time,
//! so a folder is never merged and aggregated by two refreshes at once.

pub mod worker;

pub use worker::{FolderView, RefreshEvent, RefreshRequest, RefreshService, ServiceStatus};
