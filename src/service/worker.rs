//! Refresh Service - single writer for the cached tree
//!
//! The engine lives on a blocking thread that drains a command queue. Callers
//! get progress and completion events on a per-request channel, which keeps
//! every mutation of the tree on that one thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, DeepRefresh, Engine, RefreshOutcome};
use crate::display::{header, listing};
use crate::tree::ROOT;

/// A refresh requested by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    /// Slash-separated folder path
    pub path: String,
    /// Fetch even if the cached listing is fresh
    pub force: bool,
    /// Refresh the whole subtree
    pub deep: bool,
}

/// Events emitted while a refresh request is processed
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshEvent {
    Progress {
        path: String,
        completed: usize,
        planned: usize,
        fraction: f64,
    },
    Completed {
        path: String,
        size: u64,
        /// Whether the lister ran for the requested folder
        refreshed: bool,
        /// Folders below the request whose listing failed
        failures: Vec<String>,
    },
    Failed {
        path: String,
        error: String,
    },
}

/// Rendered listing of one folder
#[derive(Debug, Clone, PartialEq)]
pub struct FolderView {
    pub path: String,
    pub header: String,
    pub size: u64,
    pub known: usize,
    pub unknown: usize,
    pub last_refreshed_at: i64,
    pub cursor: usize,
    pub rows: Vec<String>,
}

/// Service-wide counters
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    pub folders: usize,
    pub root_size: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    pub snapshot_path: String,
}

enum Command {
    Refresh {
        request: RefreshRequest,
        events: mpsc::UnboundedSender<RefreshEvent>,
    },
    List {
        path: String,
        cursor: Option<usize>,
        reply: oneshot::Sender<Result<FolderView, String>>,
    },
    Status {
        reply: oneshot::Sender<ServiceStatus>,
    },
}

/// Handle to the refresh thread; cheap to clone
#[derive(Clone)]
pub struct RefreshService {
    tx: mpsc::UnboundedSender<Command>,
    cancel: Arc<AtomicBool>,
}

impl RefreshService {
    /// Move `engine` onto a blocking thread and start serving commands
    ///
    /// The thread first ensures the root listing, then processes commands in
    /// arrival order. It exits when every handle is dropped or when a save
    /// fails.
    pub fn spawn(engine: Engine) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);

        let handle = tokio::task::spawn_blocking(move || run(engine, rx, worker_cancel));

        (Self { tx, cancel }, handle)
    }

    /// Queue a refresh; events arrive on the returned channel
    pub fn refresh(&self, request: RefreshRequest) -> Result<mpsc::UnboundedReceiver<RefreshEvent>> {
        let (events, rx) = mpsc::unbounded_channel();
        self.tx
            .send(Command::Refresh { request, events })
            .map_err(|_| anyhow!("Refresh service has stopped"))?;
        Ok(rx)
    }

    /// Listing of the folder at `path`, optionally remembering a cursor row
    pub async fn list(&self, path: &str, cursor: Option<usize>) -> Result<FolderView> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::List {
                path: path.to_string(),
                cursor,
                reply,
            })
            .map_err(|_| anyhow!("Refresh service has stopped"))?;
        rx.await
            .map_err(|_| anyhow!("Refresh service dropped the request"))?
            .map_err(|e| anyhow!(e))
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply })
            .map_err(|_| anyhow!("Refresh service has stopped"))?;
        rx.await.map_err(|_| anyhow!("Refresh service dropped the request"))
    }

    /// Stop the deep refresh in flight after its current folder
    pub fn cancel(&self) {
        info!("Cancelling refresh in flight");
        self.cancel.store(true, Ordering::Relaxed);
    }
}

fn run(mut engine: Engine, mut rx: mpsc::UnboundedReceiver<Command>, cancel: Arc<AtomicBool>) {
    match engine.ensure_data(ROOT, false, None) {
        Ok(_) => {}
        Err(e) if e.is_recoverable() => warn!(error = %e, "Initial root refresh failed"),
        Err(e) => {
            error!(error = %e, "Initial root refresh failed, stopping refresh service");
            return;
        }
    }

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Refresh { request, events } => {
                if let Err(e) = handle_refresh(&mut engine, &request, &events, &cancel) {
                    error!(error = %e, path = %request.path, "Unrecoverable cache error, stopping refresh service");
                    break;
                }
            }
            Command::List { path, cursor, reply } => {
                let _ = reply.send(handle_list(&mut engine, &path, cursor));
            }
            Command::Status { reply } => {
                let stats = engine.stats();
                let tree = engine.tree();
                let _ = reply.send(ServiceStatus {
                    folders: tree.len(),
                    root_size: tree.folder(ROOT).size(),
                    cache_hits: stats.hits,
                    cache_misses: stats.misses,
                    hit_rate: stats.hit_rate(),
                    snapshot_path: engine.store().path().display().to_string(),
                });
            }
        }
    }

    let stats = engine.stats();
    debug!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = %format!("{:.1}%", stats.hit_rate()),
        "Refresh service stopped"
    );
}

/// Process one refresh; only unrecoverable errors are returned
fn handle_refresh(
    engine: &mut Engine,
    request: &RefreshRequest,
    events: &mpsc::UnboundedSender<RefreshEvent>,
    cancel: &Arc<AtomicBool>,
) -> Result<(), CacheError> {
    cancel.store(false, Ordering::Relaxed);
    info!(
        path = %request.path,
        force = request.force,
        deep = request.deep,
        "Processing refresh request"
    );

    let failed = |e: &CacheError| {
        let _ = events.send(RefreshEvent::Failed {
            path: request.path.clone(),
            error: e.to_string(),
        });
    };

    let id = match engine.resolve_path(&request.path) {
        Ok(id) => id,
        Err(e) => {
            failed(&e);
            return if e.is_recoverable() { Ok(()) } else { Err(e) };
        }
    };

    let result = if request.deep {
        let progress_tx = events.clone();
        let mut deep = DeepRefresh::new(move |tree, id, p| {
            let _ = progress_tx.send(RefreshEvent::Progress {
                path: tree.folder(id).path().to_string(),
                completed: p.completed,
                planned: p.planned,
                fraction: p.fraction,
            });
        })
        .with_cancel(Arc::clone(cancel));
        let outcome = engine.ensure_data(id, request.force, Some(&mut deep));
        outcome.map(|o| (o, deep.into_failures()))
    } else {
        engine
            .ensure_data(id, request.force, None)
            .map(|o| (o, Vec::new()))
    };

    match result {
        Ok((outcome, failures)) => {
            let folder = engine.tree().folder(id);
            let _ = events.send(RefreshEvent::Completed {
                path: folder.path().to_string(),
                size: folder.size(),
                refreshed: matches!(outcome, RefreshOutcome::Refreshed(_)),
                failures: failures
                    .iter()
                    .map(|f| format!("{}: {}", f.path, f.error))
                    .collect(),
            });
            Ok(())
        }
        Err(e) => {
            failed(&e);
            if e.is_recoverable() {
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

fn handle_list(engine: &mut Engine, path: &str, cursor: Option<usize>) -> Result<FolderView, String> {
    let id = engine.resolve_path(path).map_err(|e| e.to_string())?;
    if let Some(cursor) = cursor {
        engine.set_cursor(id, cursor);
    }

    let tree = engine.tree();
    let folder = tree.folder(id);
    let rows = listing(tree, id);
    Ok(FolderView {
        path: folder.path().to_string(),
        header: header(tree, id),
        size: folder.size(),
        known: folder.known(),
        unknown: folder.unknown(),
        last_refreshed_at: folder.last_refreshed_at,
        cursor: rows.cursor,
        rows: rows.rows.iter().map(|r| r.render()).collect(),
    })
}
