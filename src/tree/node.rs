//! Folder arena with stable handles
//!
//! Folders live in a single `Vec` and refer to each other by `FolderId`.
//! Nodes are never removed, so a handle stays valid for the life of the tree.

use std::collections::HashMap;

use crate::lister::file_extension;

/// Separator between path components; also the path of the root folder
pub const PATH_SEPARATOR: &str = "/";

/// Handle of the root folder (always the first arena slot)
pub const ROOT: FolderId = FolderId(0);

/// Stable handle to a folder in a `Tree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderId(usize);

/// A remote file. Leaf entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub id: String,
    pub name: String,
    /// Extension including the dot, derived from `name`
    pub ext: String,
    pub size: u64,
    pub created_at: i64,
}

impl File {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64, created_at: i64) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            ext: file_extension(&name).to_string(),
            name,
            size,
            created_at,
        }
    }
}

/// A remote folder
///
/// Persisted: `id`, `name`, children, `created_at`, `last_refreshed_at`.
/// Everything else is derived by the aggregator and never serialized.
#[derive(Debug, Clone)]
pub struct Folder {
    /// Remote identifier (empty for the drive root)
    pub id: String,
    pub name: String,
    pub created_at: i64,
    /// Seconds since the epoch of the last successful listing; 0 = never
    pub last_refreshed_at: i64,
    pub(crate) folders: Vec<FolderId>,
    pub(crate) files: Vec<File>,

    pub(crate) size: u64,
    pub(crate) known: usize,
    pub(crate) unknown: usize,
    pub(crate) folder_idx: HashMap<String, FolderId>,
    pub(crate) file_idx: HashMap<String, usize>,
    pub(crate) path: String,
    pub(crate) parent: Option<FolderId>,
    /// Last selected row in a listing of this folder
    pub(crate) cursor: usize,
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at,
            last_refreshed_at: 0,
            folders: Vec::new(),
            files: Vec::new(),
            size: 0,
            known: 0,
            unknown: 0,
            folder_idx: HashMap::new(),
            file_idx: HashMap::new(),
            path: String::new(),
            parent: None,
            cursor: 0,
        }
    }

    /// Aggregate size of all files below this folder
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Immediate child folders that are fresh
    pub fn known(&self) -> usize {
        self.known
    }

    /// Immediate child folders that are stale or never listed
    pub fn unknown(&self) -> usize {
        self.unknown
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<FolderId> {
        self.parent
    }

    pub fn folders(&self) -> &[FolderId] {
        &self.folders
    }

    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub fn folder_by_name(&self, name: &str) -> Option<FolderId> {
        self.folder_idx.get(name).copied()
    }

    pub fn file_by_name(&self, name: &str) -> Option<&File> {
        self.file_idx.get(name).map(|&i| &self.files[i])
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// The whole cached drive
#[derive(Debug, Clone)]
pub struct Tree {
    folders: Vec<Folder>,
}

impl Tree {
    /// Create a tree holding only an empty, never-listed root
    pub fn new() -> Self {
        Self::with_root(Folder::new("", "", 0))
    }

    /// Create a tree around an existing root folder
    pub fn with_root(mut root: Folder) -> Self {
        root.parent = None;
        root.path = PATH_SEPARATOR.to_string();
        root.folders.clear();
        Self { folders: vec![root] }
    }

    /// Number of folders in the tree, root included
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.folders.len() == 1 && self.folders[0].folders.is_empty() && self.folders[0].files.is_empty()
    }

    pub fn folder(&self, id: FolderId) -> &Folder {
        &self.folders[id.0]
    }

    pub(crate) fn folder_mut(&mut self, id: FolderId) -> &mut Folder {
        &mut self.folders[id.0]
    }

    pub fn get(&self, id: FolderId) -> Option<&Folder> {
        self.folders.get(id.0)
    }

    /// Attach `child` under `parent`, wiring its back-reference and path
    pub fn attach_folder(&mut self, parent: FolderId, mut child: Folder) -> FolderId {
        let id = FolderId(self.folders.len());
        child.parent = Some(parent);
        child.path = join_path(&self.folders[parent.0].path, &child.name);
        child.folders.clear();
        self.folders.push(child);
        self.folders[parent.0].folders.push(id);
        id
    }

    /// Remember the selected listing row of `id`
    pub fn set_cursor(&mut self, id: FolderId, cursor: usize) {
        self.folders[id.0].cursor = cursor;
    }

    pub fn attach_file(&mut self, parent: FolderId, file: File) {
        self.folders[parent.0].files.push(file);
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: FolderId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).and_then(|f| f.parent),
        }
    }

    /// Whether `id` is a valid handle connected to the root
    pub fn reaches_root(&self, id: FolderId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        id == ROOT || self.ancestors(id).last() == Some(ROOT)
    }

    /// Look up a folder by slash-separated path using the name indices
    ///
    /// Only folders already known to the cache can be found.
    #[cfg(test)]
    pub fn resolve(&self, path: &str) -> Option<FolderId> {
        let mut cur = ROOT;
        for part in split_path(path) {
            cur = self.folder(cur).folder_by_name(part)?;
        }
        Some(cur)
    }

    /// Every folder handle in the subtree of `id`, pre-order
    #[cfg(test)]
    pub fn descendants(&self, id: FolderId) -> Vec<FolderId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.folder(cur).folders.iter().rev().copied());
        }
        out
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a folder's ancestors
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<FolderId>,
}

impl Iterator for Ancestors<'_> {
    type Item = FolderId;

    fn next(&mut self) -> Option<FolderId> {
        let cur = self.next?;
        self.next = self.tree.folder(cur).parent;
        Some(cur)
    }
}

/// Path of a child named `name` under `parent_path`
pub fn join_path(parent_path: &str, name: &str) -> String {
    if parent_path.ends_with(PATH_SEPARATOR) {
        format!("{}{}", parent_path, name)
    } else {
        format!("{}{}{}", parent_path, PATH_SEPARATOR, name)
    }
}

/// Non-empty components of a slash-separated path
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR).filter(|p| !p.is_empty())
}
