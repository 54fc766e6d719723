//! Remote folder enumeration
//!
//! A `Lister` returns one level of children for a remote folder. The engine
//! never talks to the remote drive any other way.

pub mod errors;
pub mod gdrive;
pub mod types;

pub use errors::ListError;
pub use gdrive::GdriveLister;
pub use types::*;

use std::sync::Arc;

/// One-level enumeration of a remote folder
///
/// `folder_id` is the remote identifier; the empty string is the drive root.
/// Implementations return at most their configured number of entries and
/// never paginate.
pub trait Lister: Send + Sync {
    fn list(&self, folder_id: &str) -> Result<Vec<Entry>, ListError>;
}

impl<L: Lister + ?Sized> Lister for Arc<L> {
    fn list(&self, folder_id: &str) -> Result<Vec<Entry>, ListError> {
        (**self).list(folder_id)
    }
}

impl<L: Lister + ?Sized> Lister for Box<L> {
    fn list(&self, folder_id: &str) -> Result<Vec<Entry>, ListError> {
        (**self).list(folder_id)
    }
}
