//! drivetree - incremental local cache of a remote drive's folder tree
//!
//! Keeps a snapshot of the drive's folders and files, refreshes listings
//! when they go stale and serves the result to front-ends over a Unix socket.

mod cache;
mod config;
mod display;
mod ipc;
mod lister;
mod service;
mod tree;

use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cache::{DeepRefresh, Engine, RefreshOutcome};
use config::Config;
use display::{format_size, header, listing};
use ipc::IpcServer;
use service::RefreshService;
use tree::SystemClock;

/// CLI command
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Run IPC server mode (default)
    Serve,
    /// Print the listing of a folder
    Ls { path: String },
    /// Refresh a folder (CLI mode)
    Refresh { path: String, force: bool, deep: bool },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"drivetree - Cached size explorer for a remote drive

USAGE:
    drivetree                                   # Run IPC server (default)
    drivetree serve
    drivetree ls [path]
    drivetree refresh [--force] [--deep] [path]
    drivetree help

COMMANDS:
    serve    Run IPC server mode (waits for commands from a front-end)
    ls       Print a folder listing, fetching stale parents on the way
    refresh  Refresh a folder; --force ignores freshness, --deep recurses
    help     Show this help message

ENVIRONMENT:
    DRIVETREE_SNAPSHOT      Snapshot file (default: <cache dir>/drivetree/db.json)
    DRIVETREE_HORIZON_SECS  Age after which a listing is refreshed (default: 604800)
    DRIVETREE_LISTER        Lister executable (default: gdrive)
    DRIVETREE_MAX_ENTRIES   Entries per listing (default: 300)
    DRIVETREE_SOCKET        IPC socket path (default: /tmp/drivetree.sock)
    RUST_LOG                Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.get(1) else {
        return Ok(Command::Serve);
    };

    match command.as_str() {
        "serve" => Ok(Command::Serve),
        "ls" => Ok(Command::Ls {
            path: args.get(2).cloned().unwrap_or_else(|| "/".to_string()),
        }),
        "refresh" => {
            let mut force = false;
            let mut deep = false;
            let mut path = None;
            for arg in &args[2..] {
                match arg.as_str() {
                    "--force" | "-f" => force = true,
                    "--deep" | "-d" => deep = true,
                    flag if flag.starts_with('-') => {
                        return Err(anyhow!("Unknown refresh flag: {}", flag));
                    }
                    p if path.is_none() => path = Some(p.to_string()),
                    extra => return Err(anyhow!("Unexpected argument: {}", extra)),
                }
            }
            Ok(Command::Refresh {
                path: path.unwrap_or_else(|| "/".to_string()),
                force,
                deep,
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", command);
            Ok(Command::Help)
        }
    }
}

fn open_engine(config: &Config) -> Result<Engine> {
    Engine::open(
        config.store(),
        config.lister(),
        config.policy(),
        Arc::new(SystemClock),
    )
    .context("Failed to open snapshot")
}

fn run_ls(config: &Config, path: &str) -> Result<()> {
    let mut engine = open_engine(config)?;
    let id = engine.resolve_path(path)?;

    let tree = engine.tree();
    println!("{}", header(tree, id));
    for row in listing(tree, id).rows {
        println!("{}", row.render());
    }
    Ok(())
}

fn run_refresh(config: &Config, path: &str, force: bool, deep: bool) -> Result<()> {
    let mut engine = open_engine(config)?;
    let id = engine.resolve_path(path)?;

    let (outcome, failures) = if deep {
        let mut deep = DeepRefresh::new(|_, _, _| {});
        let outcome = engine.ensure_data(id, force, Some(&mut deep))?;
        (outcome, deep.into_failures())
    } else {
        (engine.ensure_data(id, force, None)?, Vec::new())
    };

    let folder = engine.tree().folder(id);
    match outcome {
        RefreshOutcome::CacheHit => println!("{} is fresh ({})", folder.path(), format_size(folder.size())),
        RefreshOutcome::Refreshed(stats) => println!(
            "{} refreshed ({}): {} new folders, {} new files",
            folder.path(),
            format_size(folder.size()),
            stats.added_folders,
            stats.added_files
        ),
    }
    for failure in &failures {
        eprintln!("failed: {}: {}", failure.path, failure.error);
    }

    let stats = engine.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = %format!("{:.1}%", stats.hit_rate()),
        "Cache metrics"
    );

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} folder(s) could not be listed", failures.len()))
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(snapshot = %config.snapshot_path.display(), "Starting drivetree in IPC server mode");

    let engine = tokio::task::spawn_blocking({
        let config = config.clone();
        move || open_engine(&config)
    })
    .await??;
    let (service, mut worker) = RefreshService::spawn(engine);

    let mut ipc_server = IpcServer::new(service, &config.socket_path);
    if let Err(e) = ipc_server.start().await {
        error!(error = %e, "Failed to start IPC server");
        return Err(e);
    }
    let ipc_server = Arc::new(ipc_server);

    info!("Daemon ready. Waiting for commands...");

    let runner = Arc::clone(&ipc_server);
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            error!(error = %e, "IPC server error");
        }
    });

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Received shutdown signal");
            Ok(())
        }
        _ = &mut worker => Err(anyhow!("Refresh service stopped unexpectedly")),
    };

    ipc_handle.abort();
    ipc_server.stop().await?;
    info!("Shutdown complete.");
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let config = Config::from_env()?;

    match command {
        Command::Serve => serve(config).await,
        Command::Ls { path } => {
            tokio::task::spawn_blocking(move || run_ls(&config, &path)).await?
        }
        Command::Refresh { path, force, deep } => {
            tokio::task::spawn_blocking(move || run_refresh(&config, &path, force, deep)).await?
        }
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("drivetree")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_default_is_serve() {
        assert_eq!(parse_args(&args(&[])).unwrap(), Command::Serve);
    }

    #[test]
    fn test_parse_refresh_flags() {
        assert_eq!(
            parse_args(&args(&["refresh", "--deep", "/photos", "-f"])).unwrap(),
            Command::Refresh {
                path: "/photos".into(),
                force: true,
                deep: true
            }
        );
        assert_eq!(
            parse_args(&args(&["refresh"])).unwrap(),
            Command::Refresh {
                path: "/".into(),
                force: false,
                deep: false
            }
        );
        assert!(parse_args(&args(&["refresh", "--shallow"])).is_err());
        assert!(parse_args(&args(&["refresh", "/a", "/b"])).is_err());
    }

    #[test]
    fn test_parse_ls_and_help() {
        assert_eq!(
            parse_args(&args(&["ls", "/docs"])).unwrap(),
            Command::Ls { path: "/docs".into() }
        );
        assert_eq!(parse_args(&args(&["--help"])).unwrap(), Command::Help);
        assert_eq!(parse_args(&args(&["frobnicate"])).unwrap(), Command::Help);
    }
}
