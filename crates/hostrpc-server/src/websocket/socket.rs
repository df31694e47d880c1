//! One upgraded socket: a reader that enqueues frames into the session and
//! a writer that drains the connection's outbound queue and sends Pings.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use hostrpc_registry::ClientId;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::server::AppState;
use crate::session::SessionEvent;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run a connected client until either side closes or the server stops.
#[instrument(skip_all, fields(client_id = %client_id, remote = %remote))]
pub async fn run_ws_session(ws: WebSocket, client_id: ClientId, remote: SocketAddr, state: AppState) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_size.max(1));
    let connection = Arc::new(ClientConnection::new(client_id.clone(), remote, send_tx));

    if !state.queue.send(SessionEvent::Open(connection.clone())) {
        warn!("session is not running, dropping connection");
        return;
    }
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let closing = state.shutdown.child_token();
    let writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        connection.clone(),
        closing.clone(),
        state.config.heartbeat_interval,
        state.config.heartbeat_timeout,
    ));

    loop {
        let frame = tokio::select! {
            () = closing.cancelled() => break,
            frame = ws_rx.next() => frame,
        };
        let event = match frame {
            None => break,
            Some(Err(err)) => {
                let _ = state.queue.send(SessionEvent::Error {
                    client: client_id.clone(),
                    message: err.to_string(),
                });
                break;
            }
            Some(Ok(Message::Text(text))) => SessionEvent::Text {
                client: client_id.clone(),
                text: text.as_str().to_owned(),
            },
            Some(Ok(Message::Binary(data))) => SessionEvent::Binary {
                client: client_id.clone(),
                data,
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                connection.mark_alive();
                continue;
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(code = frame.as_ref().map(|f| f.code), "client sent close frame");
                break;
            }
        };
        if !state.queue.send(event) {
            break;
        }
    }

    closing.cancel();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        debug!("writer did not finish in time");
    }
    let _ = state.queue.send(SessionEvent::Close(client_id));

    info!(dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    closing: CancellationToken,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
) {
    let mut ping = tokio::time::interval(heartbeat_interval);
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            () = closing.cancelled() => break,
            message = send_rx.recv() => {
                let Some(text) = message else { break };
                let text = Arc::unwrap_or_clone(text);
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    closing.cancel();
                    return;
                }
            }
            _ = ping.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > heartbeat_timeout {
                    warn!(timeout = ?heartbeat_timeout, "client unresponsive, disconnecting");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    closing.cancel();
                    return;
                }
            }
        }
    }

    closing.cancel();
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: String::new().into(),
        })))
        .await;
}
