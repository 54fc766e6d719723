//! Merging a listing into a folder
//!
//! Children are matched by remote identifier: known children are updated in
//! place, unseen ones are attached, nothing is duplicated or removed.

use std::collections::HashMap;

use crate::lister::{file_extension, Entry, EntryKind};

use super::node::{File, Folder, FolderId, Tree};

/// What a merge changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added_folders: usize,
    pub updated_folders: usize,
    pub added_files: usize,
    pub updated_files: usize,
    pub ignored: usize,
}

impl Tree {
    /// Merge one listing of `id` into its children
    ///
    /// Derived fields are not touched; run the aggregator afterwards.
    pub fn merge_entries(&mut self, id: FolderId, entries: &[Entry]) -> MergeStats {
        let mut stats = MergeStats::default();

        let mut folders_by_id: HashMap<String, FolderId> = self
            .folder(id)
            .folders
            .iter()
            .map(|&child| (self.folder(child).id.clone(), child))
            .collect();
        let mut files_by_id: HashMap<String, usize> = self
            .folder(id)
            .files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();

        for entry in entries {
            match entry.kind {
                EntryKind::Folder => match folders_by_id.get(&entry.id) {
                    Some(&child) => {
                        let folder = self.folder_mut(child);
                        folder.name = entry.name.clone();
                        folder.created_at = entry.created_at;
                        stats.updated_folders += 1;
                    }
                    None => {
                        let child = self.attach_folder(
                            id,
                            Folder::new(entry.id.clone(), entry.name.clone(), entry.created_at),
                        );
                        folders_by_id.insert(entry.id.clone(), child);
                        stats.added_folders += 1;
                    }
                },
                EntryKind::File => match files_by_id.get(&entry.id) {
                    Some(&i) => {
                        let file = &mut self.folder_mut(id).files[i];
                        file.name = entry.name.clone();
                        file.ext = file_extension(&entry.name).to_string();
                        file.size = entry.size;
                        file.created_at = entry.created_at;
                        stats.updated_files += 1;
                    }
                    None => {
                        let folder = self.folder_mut(id);
                        files_by_id.insert(entry.id.clone(), folder.files.len());
                        folder.files.push(File::new(
                            entry.id.clone(),
                            entry.name.clone(),
                            entry.size,
                            entry.created_at,
                        ));
                        stats.added_files += 1;
                    }
                },
                EntryKind::Ignorable => stats.ignored += 1,
            }
        }

        stats
    }
}
