//! IPC Server - Unix socket server for front-ends
//!
//! Accepts connections, reads newline-delimited JSON commands and forwards
//! them to the refresh service, streaming refresh progress back.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::ipc::protocol::{parse_command, serialize_response, Command, Response};
use crate::service::{RefreshRequest, RefreshService};

/// IPC Server that listens for commands from front-ends
pub struct IpcServer {
    /// Refresh service all commands are forwarded to
    service: RefreshService,
    /// Socket path
    socket_path: PathBuf,
    /// Socket listener
    listener: Option<UnixListener>,
    /// Active connections counter
    connection_count: Arc<RwLock<u32>>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(service: RefreshService, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            service,
            socket_path: socket_path.into(),
            listener: None,
            connection_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Start the IPC server
    pub async fn start(&mut self) -> Result<()> {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .context("Failed to bind Unix socket")?;

        info!(socket_path = %self.socket_path.display(), "IPC server started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the server loop, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref()
            .context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let service = self.service.clone();
                    let connection_count = Arc::clone(&self.connection_count);

                    // Spawn a new task to handle this connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service, connection_count).await {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Stop the IPC server and clean up
    pub async fn stop(&self) -> Result<()> {
        remove_socket(&self.socket_path)?;
        info!("IPC server stopped");
        Ok(())
    }

    /// Get the number of active connections
    pub async fn connection_count(&self) -> u32 {
        *self.connection_count.read().await
    }
}

fn remove_socket(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).context("Failed to remove socket file")?;
    }
    Ok(())
}

/// Handle a single client connection
async fn handle_connection(
    stream: UnixStream,
    service: RefreshService,
    connection_count: Arc<RwLock<u32>>,
) -> Result<()> {
    {
        let mut count = connection_count.write().await;
        *count += 1;
        debug!(count = *count, "New connection");
    }

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    // Read commands line by line (newline-delimited JSON)
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                debug!(command = %trimmed, "Received command");

                let result = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => process_command(command, &service, &mut writer).await,
                    Err(e) => {
                        error!(error = %e, command = %trimmed, "Failed to parse command");
                        let response = Response::Error {
                            error: format!("Invalid command: {}", e),
                        };
                        send(&mut writer, &response).await
                    }
                };
                if let Err(e) = result {
                    error!(error = %e, "Failed to write response");
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    {
        let mut count = connection_count.write().await;
        *count = count.saturating_sub(1);
        debug!(count = *count, "Connection ended");
    }

    Ok(())
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<()> {
    let json = serialize_response(response).context("Failed to serialize response")?;
    writer.write_all(&json).await.context("Failed to write to socket")?;
    Ok(())
}

/// Process a command, writing its response(s) to `writer`
async fn process_command<W: AsyncWrite + Unpin>(
    command: Command,
    service: &RefreshService,
    writer: &mut W,
) -> Result<()> {
    match command {
        Command::Refresh { path, force, deep } => {
            info!(path = %path, force = force, deep = deep, "Processing refresh command");

            let mut events = match service.refresh(RefreshRequest { path, force, deep }) {
                Ok(events) => events,
                Err(e) => {
                    return send(writer, &Response::Error { error: e.to_string() }).await;
                }
            };

            let mut finished = false;
            while let Some(event) = events.recv().await {
                let response = Response::from(event);
                finished = response.is_final();
                send(writer, &response).await?;
            }
            if !finished {
                send(
                    writer,
                    &Response::Error {
                        error: "Refresh service stopped before the refresh finished".to_string(),
                    },
                )
                .await?;
            }
            Ok(())
        }

        Command::List { path, cursor } => {
            debug!(path = %path, "Processing list command");
            let response = match service.list(&path, cursor).await {
                Ok(view) => Response::from(view),
                Err(e) => Response::Error { error: e.to_string() },
            };
            send(writer, &response).await
        }

        Command::Cancel => {
            service.cancel();
            send(
                writer,
                &Response::Success {
                    message: Some("Cancellation requested".to_string()),
                },
            )
            .await
        }

        Command::GetStatus => {
            debug!("Processing getStatus command");
            let response = match service.status().await {
                Ok(status) => Response::from(status),
                Err(e) => Response::Error { error: e.to_string() },
            };
            send(writer, &response).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::refresh::tests::{policy, ScriptedLister, NOW};
    use crate::cache::{Engine, SnapshotStore};
    use crate::tree::staleness::tests::ManualClock;
    use crate::tree::Tree;

    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(
            Tree::new(),
            ScriptedLister::sample(),
            SnapshotStore::new(dir.path().join("db.json")),
            policy(),
            Arc::new(ManualClock::new(NOW)),
        );
        let (service, _handle) = RefreshService::spawn(engine);

        let socket = dir.path().join("dt.sock");
        let mut server = IpcServer::new(service, &socket);
        server.start().await.unwrap();
        let server = Arc::new(server);
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(b"{\"type\":\"refresh\",\"path\":\"/\",\"deep\":true,\"force\":true}\n")
            .await
            .unwrap();
        let mut last = String::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            let done = !line.contains(r#""type":"progress""#);
            last = line;
            if done {
                break;
            }
        }
        assert!(last.contains(r#""type":"refreshed""#), "unexpected: {}", last);
        assert!(last.contains(r#""size":1115"#));

        writer.write_all(b"{\"type\":\"list\",\"path\":\"/a\"}\n").await.unwrap();
        let listing = lines.next_line().await.unwrap().unwrap();
        assert!(listing.contains(r#""type":"listing""#));
        assert!(listing.contains("a1/"));
        assert_eq!(server.connection_count().await, 1);

        writer.write_all(b"not json\n").await.unwrap();
        let error = lines.next_line().await.unwrap().unwrap();
        assert!(error.contains("Invalid command"));

        server.stop().await.unwrap();
        assert!(!socket.exists());
    }
}
