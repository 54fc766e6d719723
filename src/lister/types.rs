//! Listing entry types and field parsers
//!
//! Defines the entries a `Lister` returns and the parsers for the size and
//! timestamp columns of a listing.

use chrono::NaiveDateTime;

use super::errors::ListError;

/// Timestamp format of the `Created` column
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file with a byte size
    File,
    /// A folder that can be listed in turn
    Folder,
    /// Known remote entry type that has no place in the tree (documents, shortcuts)
    Ignorable,
}

/// One child of a listed folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    /// Remote identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Size in bytes (0 for folders)
    pub size: u64,
    /// Creation time in seconds since the epoch
    pub created_at: i64,
}

impl Entry {
    pub fn file(id: &str, name: &str, size: u64, created_at: i64) -> Self {
        Self {
            kind: EntryKind::File,
            id: id.to_string(),
            name: name.to_string(),
            size,
            created_at,
        }
    }

    pub fn folder(id: &str, name: &str, created_at: i64) -> Self {
        Self {
            kind: EntryKind::Folder,
            id: id.to_string(),
            name: name.to_string(),
            size: 0,
            created_at,
        }
    }
}

/// Parse a size column value into bytes
///
/// Accepts a bare integer byte count (`"2048"`) or a number followed by a
/// binary unit (`"1.5 KB"`, `"3mb"`). Units are case-insensitive.
pub fn parse_size(raw: &str) -> Result<u64, ListError> {
    let s = raw.trim();
    if let Ok(bytes) = s.parse::<u64>() {
        return Ok(bytes);
    }

    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| ListError::parse("size", raw))?;
    let (number, unit) = s.split_at(split);

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "b" => 1,
        "kb" => 1 << 10,
        "mb" => 1 << 20,
        "gb" => 1 << 30,
        "tb" => 1 << 40,
        _ => return Err(ListError::parse("size", raw)),
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| ListError::parse("size", raw))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ListError::parse("size", raw));
    }

    Ok((value * multiplier as f64) as u64)
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp (UTC) into epoch seconds
pub fn parse_date(raw: &str) -> Result<i64, ListError> {
    NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| ListError::parse("date", raw))
}

/// Extension of a file name, including the leading dot
///
/// Returns an empty string when the name has no dot.
pub fn file_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[idx..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_bytes() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("2048").unwrap(), 2048);
        assert_eq!(parse_size(" 17 ").unwrap(), 17);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("512 B").unwrap(), 512);
        assert_eq!(parse_size("1.5 KB").unwrap(), 1536);
        assert_eq!(parse_size("2 mb").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1 GB").unwrap(), 1 << 30);
        assert_eq!(parse_size("1 tb").unwrap(), 1 << 40);
        assert_eq!(parse_size("3MB").unwrap(), 3 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("12 parsecs").is_err());
        assert!(parse_size("KB").is_err());
        assert!(parse_size("-1 KB").is_err());
        assert!(parse_size("1 2 KB").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("1970-01-01 00:00:00").unwrap(), 0);
        assert_eq!(parse_date("2024-03-01 12:30:45").unwrap(), 1_709_296_245);
        assert!(parse_date("2024-03-01").is_err());
        assert!(parse_date("01/03/2024 12:30:45").is_err());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("photo.jpg"), ".jpg");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("README"), "");
    }
}
