//! Local IPC transport for `agent-rooms-ctl` and co-located tools.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Each line in either direction is one
//! tagged JSON record from [`super::protocol`]:
//!
//! ```json
//! {"type":"list_rooms"}
//! {"type":"room_list","rooms":[]}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::connection::ClientConnection;
use super::protocol::ServerMessage;
use crate::orchestrator::RoomManager;
use crate::{AppError, Result};

/// Spawn the IPC server task listening on `name`.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    name: &str,
    manager: Arc<RoomManager>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = name.to_owned();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, Arc::clone(&manager), ct.clone()));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Serve one IPC client until EOF, a write failure, or shutdown.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    manager: Arc<RoomManager>,
    ct: CancellationToken,
) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let conn = ClientConnection::open(manager, out_tx);

        let writer_task = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let mut line = serde_json::to_string(&message).unwrap_or_else(|_| {
                    r#"{"type":"error","error":"serialization failed"}"#.to_owned()
                });
                line.push('\n');
                if let Err(err) = writer.write_all(line.as_bytes()).await {
                    warn!(%err, "failed to write ipc message");
                    break;
                }
            }
        });

        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                biased;

                () = ct.cancelled() => break,

                next = lines.next_line() => match next {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            conn.handle_text(trimmed).await;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%err, "ipc read error");
                        break;
                    }
                },
            }
        }

        conn.close();
        drop(conn);
        // Let queued replies drain before the socket closes.
        if tokio::time::timeout(std::time::Duration::from_secs(1), writer_task)
            .await
            .is_err()
        {
            debug!("ipc writer did not drain in time");
        }
        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}
