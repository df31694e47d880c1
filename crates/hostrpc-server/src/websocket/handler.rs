//! WebSocket upgrade and the digest-auth gate.

use std::net::SocketAddr;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use hostrpc_auth::{CHALLENGE_CLOSE_CODE, ChallengeBody, Decision, Handshake};
use hostrpc_registry::ClientId;
use metrics::counter;
use tracing::debug;

use super::socket::run_ws_session;
use crate::metrics::AUTH_DECISIONS_TOTAL;
use crate::server::AppState;

/// Upgrade any path to a WebSocket, subject to digest auth when enabled.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let ws = ws.max_message_size(state.config.max_message_size);

    if let Some(auth) = state.auth.clone() {
        let handshake = Handshake {
            path: uri.path(),
            query: uri.query(),
            host: headers.get(header::HOST).and_then(|v| v.to_str().ok()),
            remote: remote.ip(),
        };
        match auth.authenticate(&handshake) {
            Decision::Reject => {
                counter!(AUTH_DECISIONS_TOTAL, "decision" => "reject").increment(1);
                return StatusCode::UNAUTHORIZED.into_response();
            }
            Decision::Challenge => {
                counter!(AUTH_DECISIONS_TOTAL, "decision" => "challenge").increment(1);
                let Some(challenge) = auth.challenge(&handshake) else {
                    return StatusCode::UNAUTHORIZED.into_response();
                };
                return ws.on_upgrade(move |socket| send_challenge(socket, challenge));
            }
            Decision::Accept => {
                counter!(AUTH_DECISIONS_TOTAL, "decision" => "accept").increment(1);
            }
        }
    }

    let client_id = ClientId::new();
    ws.on_upgrade(move |socket| run_ws_session(socket, client_id, remote, state))
}

/// Close a freshly upgraded socket with the challenge as the close reason.
async fn send_challenge(mut socket: WebSocket, challenge: ChallengeBody) {
    let reason = match serde_json::to_string(&challenge) {
        Ok(reason) => reason,
        Err(err) => {
            debug!(error = %err, "failed to encode challenge");
            return;
        }
    };
    let frame = CloseFrame {
        code: CHALLENGE_CLOSE_CODE,
        reason: reason.into(),
    };
    if let Err(err) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %err, "failed to deliver challenge");
    }
}
