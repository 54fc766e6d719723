//! Runtime configuration
//!
//! Defaults suit a single user running `gdrive`; every field can be
//! overridden through a `DRIVETREE_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::SnapshotStore;
use crate::lister::gdrive::{DEFAULT_MAX_ENTRIES, DEFAULT_SEPARATOR};
use crate::lister::GdriveLister;
use crate::tree::staleness::DEFAULT_HORIZON;
use crate::tree::StalenessPolicy;

/// Default IPC socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/drivetree.sock";

/// Snapshot file name inside the cache directory
const SNAPSHOT_FILE: &str = "db.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where the tree snapshot lives
    pub snapshot_path: PathBuf,
    /// Age after which a cached listing is fetched again
    pub horizon: Duration,
    /// Lister executable
    pub lister_program: String,
    /// Maximum entries per listing
    pub max_entries: u32,
    /// Column separator of the lister output
    pub separator: String,
    /// Unix socket for the IPC server
    pub socket_path: PathBuf,
}

impl Config {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup("DRIVETREE_SNAPSHOT") {
            config.snapshot_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup("DRIVETREE_HORIZON_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid DRIVETREE_HORIZON_SECS: {:?}", secs))?;
            config.horizon = Duration::from_secs(secs);
        }
        if let Some(program) = lookup("DRIVETREE_LISTER") {
            config.lister_program = program;
        }
        if let Some(max) = lookup("DRIVETREE_MAX_ENTRIES") {
            config.max_entries = max
                .trim()
                .parse()
                .with_context(|| format!("Invalid DRIVETREE_MAX_ENTRIES: {:?}", max))?;
        }
        if let Some(path) = lookup("DRIVETREE_SOCKET") {
            config.socket_path = PathBuf::from(path);
        }

        Ok(config)
    }

    pub fn lister(&self) -> GdriveLister {
        GdriveLister::new(&self.lister_program, self.max_entries, &self.separator)
    }

    pub fn policy(&self) -> StalenessPolicy {
        StalenessPolicy::new(self.horizon)
    }

    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.snapshot_path)
    }
}

impl Default for Config {
    fn default() -> Self {
        let snapshot_path = dirs::cache_dir()
            .map(|dir| dir.join("drivetree").join(SNAPSHOT_FILE))
            .unwrap_or_else(|| PathBuf::from(SNAPSHOT_FILE));

        Self {
            snapshot_path,
            horizon: DEFAULT_HORIZON,
            lister_program: "gdrive".to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            separator: DEFAULT_SEPARATOR.to_string(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.horizon, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.lister_program, "gdrive");
        assert_eq!(config.max_entries, 300);
        assert_eq!(config.separator, "^^^^^");
        assert!(config.snapshot_path.ends_with("db.json"));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/drivetree.sock"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DRIVETREE_SNAPSHOT", "/var/tmp/tree.json"),
            ("DRIVETREE_HORIZON_SECS", "60"),
            ("DRIVETREE_LISTER", "/opt/bin/gdrive"),
            ("DRIVETREE_MAX_ENTRIES", "50"),
            ("DRIVETREE_SOCKET", "/run/dt.sock"),
        ]))
        .unwrap();

        assert_eq!(config.snapshot_path, PathBuf::from("/var/tmp/tree.json"));
        assert_eq!(config.policy(), StalenessPolicy::new(Duration::from_secs(60)));
        assert_eq!(config.lister().command_args("")[5], "50");
        assert_eq!(config.store().path(), PathBuf::from("/var/tmp/tree.json").as_path());
        assert_eq!(config.socket_path, PathBuf::from("/run/dt.sock"));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[("DRIVETREE_HORIZON_SECS", "a week")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DRIVETREE_MAX_ENTRIES", "-3")])).is_err());
    }
}
