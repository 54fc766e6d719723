//! IPC protocol definitions
//!
//! Newline-delimited JSON exchanged with front-ends over a Unix domain
//! socket. A `refresh` command is answered by zero or more `progress`
//! responses followed by one `refreshed` or `error` response; every other
//! command gets exactly one response.

use serde::{Deserialize, Serialize};

use crate::service::{FolderView, RefreshEvent, ServiceStatus};

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Commands sent from a front-end to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Refresh a folder, optionally forced and/or recursive
    #[serde(rename_all = "camelCase")]
    Refresh {
        path: String,
        #[serde(default)]
        force: bool,
        #[serde(default)]
        deep: bool,
    },
    /// Render the cached listing of a folder
    #[serde(rename_all = "camelCase")]
    List {
        #[serde(default = "root_path")]
        path: String,
        /// Row to remember as selected
        #[serde(default)]
        cursor: Option<usize>,
    },
    /// Cancel the deep refresh in flight
    Cancel,
    /// Get daemon status and cache counters
    GetStatus,
}

fn root_path() -> String {
    "/".to_string()
}

/// Responses sent from the daemon to a front-end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Success response
    #[serde(rename_all = "camelCase")]
    Success {
        /// Optional success message
        message: Option<String>,
    },
    /// Error response
    #[serde(rename_all = "camelCase")]
    Error {
        /// Error message
        error: String,
    },
    /// Intermediate state of a deep refresh
    #[serde(rename_all = "camelCase")]
    Progress {
        path: String,
        completed: usize,
        planned: usize,
        fraction: f64,
    },
    /// A refresh finished
    #[serde(rename_all = "camelCase")]
    Refreshed {
        path: String,
        size: u64,
        refreshed: bool,
        failures: Vec<String>,
    },
    /// Folder listing
    #[serde(rename_all = "camelCase")]
    Listing {
        path: String,
        header: String,
        size: u64,
        known: usize,
        unknown: usize,
        last_refreshed_at: i64,
        cursor: usize,
        rows: Vec<String>,
    },
    /// Status response with daemon state
    #[serde(rename_all = "camelCase")]
    Status {
        /// Protocol version
        version: u32,
        /// Whether daemon is healthy
        healthy: bool,
        folders: usize,
        root_size: u64,
        cache_hits: u64,
        cache_misses: u64,
        hit_rate: f64,
        snapshot_path: String,
    },
}

impl Response {
    /// Whether this response ends the exchange for its command
    pub fn is_final(&self) -> bool {
        !matches!(self, Response::Progress { .. })
    }
}

impl From<RefreshEvent> for Response {
    fn from(event: RefreshEvent) -> Self {
        match event {
            RefreshEvent::Progress {
                path,
                completed,
                planned,
                fraction,
            } => Response::Progress {
                path,
                completed,
                planned,
                fraction,
            },
            RefreshEvent::Completed {
                path,
                size,
                refreshed,
                failures,
            } => Response::Refreshed {
                path,
                size,
                refreshed,
                failures,
            },
            RefreshEvent::Failed { path, error } => Response::Error {
                error: format!("Refresh of {} failed: {}", path, error),
            },
        }
    }
}

impl From<FolderView> for Response {
    fn from(view: FolderView) -> Self {
        Response::Listing {
            path: view.path,
            header: view.header,
            size: view.size,
            known: view.known,
            unknown: view.unknown,
            last_refreshed_at: view.last_refreshed_at,
            cursor: view.cursor,
            rows: view.rows,
        }
    }
}

impl From<ServiceStatus> for Response {
    fn from(status: ServiceStatus) -> Self {
        Response::Status {
            version: PROTOCOL_VERSION,
            healthy: true,
            folders: status.folders,
            root_size: status.root_size,
            cache_hits: status.cache_hits,
            cache_misses: status.cache_misses,
            hit_rate: status.hit_rate,
            snapshot_path: status.snapshot_path,
        }
    }
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n'); // Add newline delimiter
    Ok(json)
}
