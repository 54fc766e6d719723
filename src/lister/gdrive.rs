//! `gdrive` command-line lister
//!
//! Enumerates a Google Drive folder by running `gdrive files list` and parsing
//! its separator-delimited table output.

use std::process::Command;

use tracing::{debug, warn};

use super::errors::ListError;
use super::types::{parse_date, parse_size, Entry, EntryKind};
use super::Lister;

/// Default column separator passed to `--field-separator`
pub const DEFAULT_SEPARATOR: &str = "^^^^^";

/// Default maximum entries per listing (`--max`)
pub const DEFAULT_MAX_ENTRIES: u32 = 300;

/// Column names the listing must start with, in order
const HEADER_COLUMNS: [&str; 5] = ["Id", "Name", "Type", "Size", "Created"];

/// Lister backed by the `gdrive` CLI
#[derive(Debug, Clone)]
pub struct GdriveLister {
    /// Executable to run
    program: String,
    /// Upper bound on entries per call
    max_entries: u32,
    /// Column separator
    separator: String,
}

impl GdriveLister {
    pub fn new(program: impl Into<String>, max_entries: u32, separator: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            max_entries,
            separator: separator.into(),
        }
    }

    /// Arguments for listing `folder_id` (empty = drive root)
    pub fn command_args(&self, folder_id: &str) -> Vec<String> {
        let mut args = vec![
            "files".to_string(),
            "list".to_string(),
            "--field-separator".to_string(),
            self.separator.clone(),
            "--max".to_string(),
            self.max_entries.to_string(),
        ];
        if !folder_id.is_empty() {
            args.push("--parent".to_string());
            args.push(folder_id.to_string());
        }
        args
    }
}

impl Default for GdriveLister {
    fn default() -> Self {
        Self::new("gdrive", DEFAULT_MAX_ENTRIES, DEFAULT_SEPARATOR)
    }
}

impl Lister for GdriveLister {
    fn list(&self, folder_id: &str) -> Result<Vec<Entry>, ListError> {
        let args = self.command_args(folder_id);
        debug!(program = %self.program, args = %args.join(" "), "Running lister");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| ListError::Transport(format!("failed to start {}: {}", self.program, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ListError::Transport(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            warn!(folder_id = folder_id, stderr = %stderr.trim(), "Lister wrote to stderr");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_listing(&stdout, &self.separator)
    }
}

/// Parse the table printed by `gdrive files list`
///
/// The first line must be the exact column header. Blank lines are skipped;
/// `document` and `shortcut` rows come back as `EntryKind::Ignorable`.
pub fn parse_listing(raw: &str, separator: &str) -> Result<Vec<Entry>, ListError> {
    let mut lines = raw.lines();
    let expected_header = HEADER_COLUMNS.join(separator);

    let header = lines.next().unwrap_or_default();
    if header != expected_header {
        return Err(ListError::Protocol(format!(
            "unexpected listing header: {:?}",
            header
        )));
    }

    let mut entries = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split(separator).collect();
        if parts.len() != HEADER_COLUMNS.len() {
            return Err(ListError::Protocol(format!(
                "expected {} columns, got {}: {:?}",
                HEADER_COLUMNS.len(),
                parts.len(),
                line
            )));
        }
        let (id, name, kind, size, created) = (parts[0], parts[1], parts[2], parts[3], parts[4]);

        let entry = match kind {
            "regular" => Entry::file(id, name, parse_size(size)?, parse_date(created)?),
            "folder" => Entry::folder(id, name, parse_date(created)?),
            "document" | "shortcut" => Entry {
                kind: EntryKind::Ignorable,
                id: id.to_string(),
                name: name.to_string(),
                size: 0,
                created_at: 0,
            },
            other => {
                return Err(ListError::Protocol(format!(
                    "unknown entry type {:?} for {:?}",
                    other, name
                )))
            }
        };
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::types::file_extension;

    fn table(rows: &[&str]) -> String {
        let mut out = HEADER_COLUMNS.join(DEFAULT_SEPARATOR);
        out.push('\n');
        for row in rows {
            out.push_str(&row.replace('|', DEFAULT_SEPARATOR));
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_command_args() {
        let lister = GdriveLister::default();
        assert_eq!(
            lister.command_args(""),
            vec!["files", "list", "--field-separator", "^^^^^", "--max", "300"]
        );

        let args = lister.command_args("abc");
        assert_eq!(&args[args.len() - 2..], &["--parent", "abc"]);
    }

    #[test]
    fn test_parse_mixed_listing() {
        let raw = table(&[
            "f1|notes.txt|regular|1.5 KB|2024-03-01 12:30:45",
            "",
            "d1|Photos|folder||2023-01-01 00:00:00",
            "g1|Budget|document||2023-01-01 00:00:00",
            "s1|Link|shortcut||2023-01-01 00:00:00",
        ]);

        let entries = parse_listing(&raw, DEFAULT_SEPARATOR).unwrap();
        assert_eq!(entries.len(), 4);

        assert_eq!(entries[0], Entry::file("f1", "notes.txt", 1536, 1_709_296_245));
        assert_eq!(file_extension(&entries[0].name), ".txt");
        assert_eq!(entries[1], Entry::folder("d1", "Photos", 1_672_531_200));
        assert_eq!(entries[2].kind, EntryKind::Ignorable);
        assert_eq!(entries[3].kind, EntryKind::Ignorable);
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        let raw = "Id Name Type Size Created\nf1 x regular 1 2024-01-01 00:00:00\n";
        let err = parse_listing(raw, DEFAULT_SEPARATOR).unwrap_err();
        assert!(matches!(err, ListError::Protocol(_)));

        let err = parse_listing("", DEFAULT_SEPARATOR).unwrap_err();
        assert!(matches!(err, ListError::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let raw = table(&["x1|thing|spreadsheet||2024-01-01 00:00:00"]);
        let err = parse_listing(&raw, DEFAULT_SEPARATOR).unwrap_err();
        assert!(matches!(err, ListError::Protocol(ref msg) if msg.contains("spreadsheet")));
    }

    #[test]
    fn test_parse_rejects_bad_size() {
        let raw = table(&["f1|a.bin|regular|lots|2024-01-01 00:00:00"]);
        let err = parse_listing(&raw, DEFAULT_SEPARATOR).unwrap_err();
        assert!(matches!(err, ListError::Parse { field: "size", .. }));
    }

    #[test]
    fn test_missing_program_is_transport_failure() {
        let lister = GdriveLister::new("drivetree-no-such-program", 10, DEFAULT_SEPARATOR);
        let err = lister.list("").unwrap_err();
        assert!(matches!(err, ListError::Transport(_)));
    }
}
