//! Snapshot persistence
//!
//! The whole tree is written as one nested JSON document holding only the
//! persisted fields. Writes go through a temp file and an atomic rename so a
//! crash never leaves a half-written snapshot behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use super::errors::CacheError;
use crate::tree::{rebuild, File, Folder, FolderId, StalenessPolicy, Tree, ROOT};

/// Deserialize a list that may be encoded as `null`.
/// Older snapshots write `null` for folders that were never listed.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Persisted form of a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFolder {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Folders", default, deserialize_with = "null_as_empty")]
    pub folders: Vec<SnapshotFolder>,
    #[serde(rename = "Files", default, deserialize_with = "null_as_empty")]
    pub files: Vec<SnapshotFile>,
    #[serde(rename = "Date", default)]
    pub created_at: i64,
    #[serde(rename = "LastUpdate", default)]
    pub last_refreshed_at: i64,
}

/// Persisted form of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "Date", default)]
    pub created_at: i64,
}

impl SnapshotFolder {
    /// Capture the persisted fields of the subtree at `id`
    pub fn capture(tree: &Tree, id: FolderId) -> Self {
        let folder = tree.folder(id);
        Self {
            id: folder.id.clone(),
            name: folder.name.clone(),
            folders: folder
                .folders()
                .iter()
                .map(|&child| Self::capture(tree, child))
                .collect(),
            files: folder
                .files()
                .iter()
                .map(|f| SnapshotFile {
                    id: f.id.clone(),
                    name: f.name.clone(),
                    size: f.size,
                    created_at: f.created_at,
                })
                .collect(),
            created_at: folder.created_at,
            last_refreshed_at: folder.last_refreshed_at,
        }
    }

    /// Build a disconnected tree; derived fields are left for the aggregator
    pub fn into_tree(self) -> Tree {
        let mut tree = Tree::with_root(self.to_folder());
        for file in self.files {
            tree.attach_file(ROOT, file.into());
        }
        for child in self.folders {
            child.attach_into(&mut tree, ROOT);
        }
        tree
    }

    fn attach_into(self, tree: &mut Tree, parent: FolderId) {
        let id = tree.attach_folder(parent, self.to_folder());
        for file in self.files {
            tree.attach_file(id, file.into());
        }
        for child in self.folders {
            child.attach_into(tree, id);
        }
    }

    fn to_folder(&self) -> Folder {
        let mut folder = Folder::new(self.id.clone(), self.name.clone(), self.created_at);
        folder.last_refreshed_at = self.last_refreshed_at;
        folder
    }
}

impl From<SnapshotFile> for File {
    fn from(f: SnapshotFile) -> Self {
        File::new(f.id, f.name, f.size, f.created_at)
    }
}

/// Parse a snapshot document of any folder depth
///
/// Every folder level costs two levels of JSON nesting, so the parser's
/// default recursion guard would reject trees deeper than about 64 folders.
fn parse_snapshot(raw: &[u8]) -> serde_json::Result<SnapshotFolder> {
    let mut de = serde_json::Deserializer::from_slice(raw);
    de.disable_recursion_limit();
    let snapshot = SnapshotFolder::deserialize(&mut de)?;
    de.end()?;
    Ok(snapshot)
}

/// Reads and writes the tree snapshot at a fixed path
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole tree
    pub fn save(&self, tree: &Tree) -> Result<(), CacheError> {
        let snapshot = SnapshotFolder::capture(tree, ROOT);
        let data = serde_json::to_vec(&snapshot)
            .map_err(|e| CacheError::persistence("Failed to serialize snapshot", e))?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .map_err(|e| CacheError::persistence("Failed to create snapshot directory", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| CacheError::persistence("Failed to create temp file for snapshot", e))?;
        tmp.write_all(&data)
            .map_err(|e| CacheError::persistence("Failed to write snapshot", e))?;
        tmp.persist(&self.path)
            .map_err(|e| CacheError::persistence("Failed to persist snapshot", e))?;

        debug!(
            path = %self.path.display(),
            bytes = data.len(),
            folders = tree.len(),
            "Saved snapshot"
        );
        Ok(())
    }

    /// Load the tree and rebuild every derived field
    ///
    /// A missing file yields an empty tree, as does a snapshot that cannot be
    /// parsed: the snapshot is a cache, never the source of truth.
    pub fn load(&self, policy: &StalenessPolicy, now: i64) -> Result<Tree, CacheError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot found, starting with an empty tree");
                return Ok(Tree::new());
            }
            Err(e) => return Err(CacheError::persistence("Failed to read snapshot", e)),
        };

        let snapshot = match parse_snapshot(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Snapshot is malformed, starting with an empty tree"
                );
                return Ok(Tree::new());
            }
        };

        let mut tree = snapshot.into_tree();
        rebuild(&mut tree, ROOT, policy, now);

        info!(
            path = %self.path.display(),
            folders = tree.len(),
            size = tree.folder(ROOT).size(),
            "Loaded snapshot"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::aggregate::tests::{assert_size_invariant, policy};

    const NOW: i64 = 1_000_000;

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        tree.folder_mut(ROOT).last_refreshed_at = NOW;
        let mut docs = Folder::new("d1", "docs", 5);
        docs.last_refreshed_at = NOW - 3;
        let docs = tree.attach_folder(ROOT, docs);
        tree.attach_folder(docs, Folder::new("d2", "drafts", 6));
        tree.attach_file(ROOT, File::new("f1", "top.txt", 12, 7));
        tree.attach_file(docs, File::new("f2", "plan.pdf", 4_096, 8));
        rebuild(&mut tree, ROOT, &policy(), NOW);
        tree
    }

    #[test]
    fn test_round_trip_preserves_persisted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("db.json"));
        let tree = sample_tree();

        store.save(&tree).unwrap();
        let loaded = store.load(&policy(), NOW).unwrap();

        assert_eq!(
            SnapshotFolder::capture(&tree, ROOT),
            SnapshotFolder::capture(&loaded, ROOT)
        );
        assert_eq!(loaded.folder(ROOT).path(), "/");
        assert_eq!(loaded.folder(ROOT).size(), 4_108);
        let drafts = loaded.resolve("/docs/drafts").unwrap();
        assert_eq!(loaded.folder(drafts).path(), "/docs/drafts");
        assert_eq!(loaded.folder(ROOT).known(), 1);
        assert_size_invariant(&loaded, ROOT);
    }

    #[test]
    fn test_missing_snapshot_is_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        let tree = store.load(&policy(), NOW).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_malformed_snapshot_is_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, b"{not json").unwrap();

        let tree = SnapshotStore::new(&path).load(&policy(), NOW).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_reads_null_children() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(
            &path,
            br#"{"ID":"","Name":"","Folders":[{"ID":"a","Name":"A","Folders":null,"Files":null,"Date":1,"LastUpdate":0}],
                "Files":[{"ID":"f","Name":"x.txt","Ext":".txt","Size":3,"Date":2}],"Date":0,"LastUpdate":9}"#,
        )
        .unwrap();

        let tree = SnapshotStore::new(&path).load(&policy(), NOW).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.folder(ROOT).size(), 3);
        assert_eq!(tree.folder(ROOT).files()[0].ext, ".txt");
        assert_eq!(tree.folder(ROOT).unknown(), 1);
    }

    #[test]
    fn test_round_trip_deep_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("db.json"));

        let mut tree = Tree::new();
        let mut cur = ROOT;
        for depth in 0..200 {
            cur = tree.attach_folder(cur, Folder::new(format!("d{}", depth), format!("level{}", depth), 0));
        }
        tree.attach_file(cur, File::new("leaf", "leaf.bin", 77, 0));
        rebuild(&mut tree, ROOT, &policy(), NOW);

        store.save(&tree).unwrap();
        let loaded = store.load(&policy(), NOW).unwrap();

        assert_eq!(loaded.len(), tree.len());
        assert_eq!(loaded.folder(ROOT).size(), 77);
        assert_eq!(
            SnapshotFolder::capture(&tree, ROOT),
            SnapshotFolder::capture(&loaded, ROOT)
        );
        let deepest = loaded.folder(ROOT).folders()[0];
        let deepest = loaded.descendants(deepest).last().copied().unwrap();
        assert!(loaded.folder(deepest).path().ends_with("/level199"));
    }

    #[test]
    fn test_trailing_garbage_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, br#"{"ID":"","Name":"","Folders":[],"Files":[]} trailing"#).unwrap();

        let tree = SnapshotStore::new(&path).load(&policy(), NOW).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/dir/db.json"));
        store.save(&Tree::new()).unwrap();
        assert!(store.path().exists());
    }
}
