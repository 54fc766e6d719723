//! Cached folder tree
//!
//! Arena-backed model of the remote drive: folders addressed by stable
//! `FolderId` handles, plus the aggregator that derives sizes, freshness
//! tallies, name indices and paths from the persisted fields.

pub mod aggregate;
pub mod merge;
pub mod node;
pub mod staleness;

pub use aggregate::{propagate, rebuild};
pub use merge::MergeStats;
pub use node::{File, Folder, FolderId, Tree, ROOT};
pub use staleness::{Clock, StalenessPolicy, SystemClock};
