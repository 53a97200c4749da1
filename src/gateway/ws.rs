//! WebSocket transport served by axum.
//!
//! Routes:
//! - `GET /ws`: upgrade to the room protocol.
//! - `GET /health`: plain `ok`.
//! - `GET /stats`: JSON room statistics.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::connection::ClientConnection;
use super::protocol::ServerMessage;
use crate::orchestrator::{RoomManager, RoomStats};
use crate::{AppError, Result};

/// Shared state of the HTTP router.
#[derive(Clone)]
pub struct GatewayState {
    /// Room registry every connection dispatches into.
    pub manager: Arc<RoomManager>,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Router exposing `/ws`, `/health`, and `/stats`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` fires.
///
/// # Errors
///
/// Returns `AppError::Io` when the address cannot be bound or the server
/// fails.
pub async fn serve(addr: SocketAddr, manager: Arc<RoomManager>, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind {addr}: {err}")))?;
    info!(%addr, "websocket gateway listening");

    let app = router(GatewayState {
        manager,
        shutdown: shutdown.clone(),
    });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|err| AppError::Io(format!("websocket gateway failed: {err}")))
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<GatewayState>) -> Json<RoomStats> {
    Json(state.manager.stats())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| {
        let span = info_span!("ws_conn");
        handle_socket(socket, state).instrument(span)
    })
}

/// Serve one WebSocket client.
///
/// A writer task drains the connection's outbound channel into the socket;
/// the read loop feeds text frames to the shared dispatcher.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn = ClientConnection::open(Arc::clone(&state.manager), out_tx);

    let write_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if ws_sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    loop {
        tokio::select! {
            biased;

            () = state.shutdown.cancelled() => break,

            frame = ws_receiver.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => conn.handle_text(text.as_str()).await,
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(%err, "ws read error");
                    break;
                }
            },
        }
    }

    conn.close();
    drop(conn);
    write_task.abort();
}
