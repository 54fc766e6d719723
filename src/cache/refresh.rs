//! Refresh Engine
//!
//! Decides when a folder's cached listing must be fetched again, merges the
//! fresh listing, re-aggregates, writes the snapshot through and pushes the
//! size change up to the ancestors. Deep refreshes walk a whole subtree and
//! report progress as they go.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::errors::CacheError;
use super::snapshot::SnapshotStore;
use crate::display::progress_bar;
use crate::lister::Lister;
use crate::tree::node::{join_path, split_path};
use crate::tree::{propagate, rebuild, Clock, FolderId, MergeStats, StalenessPolicy, Tree, ROOT};

/// Width of the progress bar in deep refresh log lines
const LOG_BAR_WIDTH: usize = 30;

/// Result of `Engine::ensure_data` for a single folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cached listing was fresh; nothing was fetched
    CacheHit,
    /// The folder was listed and merged
    Refreshed(MergeStats),
}

/// Snapshot of a deep refresh's progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Folders whose own refresh step has finished
    pub completed: usize,
    /// Folders discovered so far that will be visited
    pub planned: usize,
    /// Reported completion, never decreasing, exactly 1.0 at the end
    pub fraction: f64,
}

/// A folder whose listing failed during a deep refresh
#[derive(Debug)]
pub struct RefreshFailure {
    pub path: String,
    pub error: CacheError,
}

/// Shared state of one deep (recursive) refresh
///
/// `planned` starts at one for the folder the refresh begins at and grows by
/// the child count of every folder listed; `completed` grows by one per
/// folder, so both meet when the walk is done.
pub struct DeepRefresh<'a> {
    planned: usize,
    completed: usize,
    reported: f64,
    failures: Vec<RefreshFailure>,
    cancel: Option<Arc<AtomicBool>>,
    on_progress: Box<dyn FnMut(&Tree, FolderId, Progress) + 'a>,
}

impl<'a> DeepRefresh<'a> {
    pub fn new(on_progress: impl FnMut(&Tree, FolderId, Progress) + 'a) -> Self {
        Self {
            planned: 1,
            completed: 0,
            reported: 0.0,
            failures: Vec::new(),
            cancel: None,
            on_progress: Box::new(on_progress),
        }
    }

    /// Stop before the next folder once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.completed,
            planned: self.planned,
            fraction: self.reported,
        }
    }

    pub fn into_failures(self) -> Vec<RefreshFailure> {
        self.failures
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn report(&mut self, tree: &Tree, id: FolderId) {
        let raw = self.completed as f64 / self.planned as f64;
        if raw > self.reported {
            self.reported = raw;
        }
        let progress = self.progress();
        (self.on_progress)(tree, id, progress);
    }

    fn complete(&mut self, tree: &Tree, id: FolderId) {
        self.completed += 1;
        info!(
            "progress: {} {}/{}",
            progress_bar(self.completed as f64 / self.planned as f64, LOG_BAR_WIDTH),
            self.completed,
            self.planned
        );
        self.report(tree, id);
    }
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Refresh requests answered from the cache
    pub hits: u64,
    /// Refresh requests that ran the lister
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Owns the cached tree and every way of changing it
pub struct Engine {
    tree: Tree,
    lister: Box<dyn Lister>,
    store: SnapshotStore,
    policy: StalenessPolicy,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
}

impl Engine {
    pub fn new(
        tree: Tree,
        lister: impl Lister + 'static,
        store: SnapshotStore,
        policy: StalenessPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tree,
            lister: Box::new(lister),
            store,
            policy,
            clock,
            stats: CacheStats::default(),
        }
    }

    /// Build an engine around the tree stored in `store`
    pub fn open(
        store: SnapshotStore,
        lister: impl Lister + 'static,
        policy: StalenessPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let tree = store.load(&policy, clock.now())?;
        Ok(Self::new(tree, lister, store, policy, clock))
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn set_cursor(&mut self, id: FolderId, cursor: usize) {
        self.tree.set_cursor(id, cursor);
    }

    /// Whether `id` can be served from the cache right now
    pub fn is_fresh(&self, id: FolderId) -> bool {
        !self
            .policy
            .is_stale(self.tree.folder(id).last_refreshed_at, self.clock.now())
    }

    /// Make sure the listing of `id` is fresh, fetching it if needed
    ///
    /// With `force` the lister runs even for fresh folders. With `deep` every
    /// child folder is ensured in turn (with the same `force`); listing
    /// failures below `id` are recorded in `deep` instead of aborting the walk.
    pub fn ensure_data(
        &mut self,
        id: FolderId,
        force: bool,
        deep: Option<&mut DeepRefresh<'_>>,
    ) -> Result<RefreshOutcome, CacheError> {
        if !self.tree.reaches_root(id) {
            return Err(CacheError::Invariant(format!(
                "folder {:?} is not connected to the root and cannot reach the snapshot",
                id
            )));
        }

        if !force && self.is_fresh(id) {
            self.stats.hits += 1;
            trace!(path = %self.tree.folder(id).path(), "Cache HIT for folder listing");
            if let Some(deep) = deep {
                deep.complete(&self.tree, id);
            }
            return Ok(RefreshOutcome::CacheHit);
        }

        self.stats.misses += 1;
        let stats = self.refresh_one(id, force)?;

        if let Some(deep) = deep {
            self.descend(id, force, deep)?;
        }

        Ok(RefreshOutcome::Refreshed(stats))
    }

    /// Resolve a slash-separated path, ensuring each level on the way
    pub fn resolve_path(&mut self, path: &str) -> Result<FolderId, CacheError> {
        let mut cur = ROOT;
        for part in split_path(path) {
            self.ensure_data(cur, false, None)?;
            let folder = self.tree.folder(cur);
            cur = match folder.folder_by_name(part) {
                Some(child) => child,
                None if folder.file_by_name(part).is_some() => {
                    return Err(CacheError::NotFound(format!(
                        "{} is a file, not a folder",
                        join_path(folder.path(), part)
                    )));
                }
                None => return Err(CacheError::NotFound(join_path(folder.path(), part))),
            };
        }
        Ok(cur)
    }

    /// List, merge, aggregate, save and propagate one folder
    fn refresh_one(&mut self, id: FolderId, force: bool) -> Result<MergeStats, CacheError> {
        let folder = self.tree.folder(id);
        let old_size = folder.size();
        let remote_id = folder.id.clone();
        let path = folder.path().to_string();

        info!(path = %path, force = force, "Refreshing folder listing");
        let entries = self.lister.list(&remote_id)?;

        let now = self.clock.now();
        let stats = self.tree.merge_entries(id, &entries);
        self.tree.folder_mut(id).last_refreshed_at = now;
        rebuild(&mut self.tree, id, &self.policy, now);

        self.store.save(&self.tree)?;

        let size_delta = self.tree.folder(id).size() as i64 - old_size as i64;
        propagate(&mut self.tree, id, size_delta, &self.policy, now);

        debug!(
            path = %path,
            entries = entries.len(),
            added_folders = stats.added_folders,
            updated_folders = stats.updated_folders,
            added_files = stats.added_files,
            updated_files = stats.updated_files,
            ignored = stats.ignored,
            size_delta = size_delta,
            "Merged folder listing"
        );
        Ok(stats)
    }

    /// Deep step: ensure every child of `id`, then mark `id` complete
    fn descend(&mut self, id: FolderId, force: bool, deep: &mut DeepRefresh<'_>) -> Result<(), CacheError> {
        let children = self.tree.folder(id).folders().to_vec();
        deep.planned += children.len();

        for child in children {
            if deep.is_cancelled() {
                info!(path = %self.tree.folder(id).path(), "Deep refresh cancelled");
                return Err(CacheError::Cancelled);
            }

            match self.ensure_data(child, force, Some(&mut *deep)) {
                Ok(_) => {}
                Err(CacheError::List(e)) => {
                    let path = self.tree.folder(child).path().to_string();
                    warn!(path = %path, error = %e, "Listing failed, continuing with siblings");
                    deep.failures.push(RefreshFailure {
                        path,
                        error: CacheError::List(e),
                    });
                    deep.complete(&self.tree, child);
                }
                Err(e) => return Err(e),
            }

            rebuild(&mut self.tree, id, &self.policy, self.clock.now());
            deep.report(&self.tree, id);
        }

        deep.complete(&self.tree, id);
        Ok(())
    }
}
