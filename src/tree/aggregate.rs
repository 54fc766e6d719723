//! Bottom-up aggregation of derived folder fields
//!
//! `rebuild` recomputes sizes, freshness tallies, name indices, paths and
//! parent links for a whole subtree. `propagate` is the cheap O(depth)
//! follow-up that pushes one folder's size change to its ancestors.

use std::collections::HashMap;

use tracing::trace;

use super::node::{join_path, FolderId, Tree};
use super::staleness::StalenessPolicy;

/// Recompute every derived field in the subtree rooted at `id`
///
/// Children are rebuilt before they are summed. The path of `id` itself is
/// left as is; its descendants get `parent path + own name`.
pub fn rebuild(tree: &mut Tree, id: FolderId, policy: &StalenessPolicy, now: i64) {
    let children = tree.folder(id).folders.clone();
    let parent_path = tree.folder(id).path.clone();

    let mut size: u64 = 0;
    let mut known = 0;
    let mut unknown = 0;
    let mut folder_idx = HashMap::with_capacity(children.len());

    for child in children {
        {
            let folder = tree.folder_mut(child);
            folder.parent = Some(id);
            folder.path = join_path(&parent_path, &folder.name);
        }
        rebuild(tree, child, policy, now);

        let folder = tree.folder(child);
        size += folder.size;
        folder_idx.insert(folder.name.clone(), child);
        if policy.is_stale(folder.last_refreshed_at, now) {
            unknown += 1;
        } else {
            known += 1;
        }
    }

    let folder = tree.folder_mut(id);
    let mut file_idx = HashMap::with_capacity(folder.files.len());
    for (i, file) in folder.files.iter().enumerate() {
        size += file.size;
        file_idx.insert(file.name.clone(), i);
    }

    folder.size = size;
    folder.known = known;
    folder.unknown = unknown;
    folder.folder_idx = folder_idx;
    folder.file_idx = file_idx;
}

/// Reclassify the immediate child folders of `id` as known or unknown
pub fn recount_freshness(tree: &mut Tree, id: FolderId, policy: &StalenessPolicy, now: i64) {
    let (known, unknown) = tree
        .folder(id)
        .folders
        .iter()
        .fold((0, 0), |(known, unknown), &child| {
            if policy.is_stale(tree.folder(child).last_refreshed_at, now) {
                (known, unknown + 1)
            } else {
                (known + 1, unknown)
            }
        });

    let folder = tree.folder_mut(id);
    folder.known = known;
    folder.unknown = unknown;
}

/// Apply a size change of `id` to all of its ancestors
///
/// Each ancestor gets `size_delta` added and its freshness tally recounted
/// from its immediate children, so repeated refreshes cannot drift.
pub fn propagate(tree: &mut Tree, id: FolderId, size_delta: i64, policy: &StalenessPolicy, now: i64) {
    let ancestors: Vec<FolderId> = tree.ancestors(id).collect();
    for ancestor in ancestors {
        let folder = tree.folder_mut(ancestor);
        folder.size = folder.size.saturating_add_signed(size_delta);
        recount_freshness(tree, ancestor, policy, now);
    }
    trace!(size_delta = size_delta, "Propagated size change to ancestors");
}
