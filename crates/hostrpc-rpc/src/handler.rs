//! Whole-message handling: parse, batch, dispatch, encode.

use hostrpc_registry::{ClientId, PendingReplay};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapter::decode_request;
use crate::context::Effects;
use crate::errors::RpcError;
use crate::session::RpcSession;
use crate::types::{Notification, RequestId, Response};

/// Everything one inbound message produced.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Encoded reply for the caller, if any.
    pub reply: Option<String>,
    /// Encoded notifications for the caller, written after the reply.
    pub notifications: Vec<String>,
    /// Notifications for every connected client.
    pub broadcasts: Vec<Notification>,
    /// Current-value replays to schedule.
    pub replays: Vec<PendingReplay>,
}

/// Encode a value; the wire types here cannot fail to serialize.
pub fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        warn!(error = %err, "failed to encode outbound message");
        String::from("null")
    })
}

/// Handle one text message from `client`.
pub fn handle_message(text: &str, session: &mut RpcSession, client: &ClientId) -> Outcome {
    let mut effects = Effects::default();

    let reply = match serde_json::from_str::<Value>(text) {
        Err(err) => {
            debug!(client_id = %client, error = %err, "unparseable message");
            let error = RpcError::Parse {
                message: err.to_string(),
            };
            Some(encode(&Response::error(RequestId::Null, &error)))
        }
        Ok(Value::Array(items)) if items.is_empty() => Some(encode(&Response::error(
            RequestId::Null,
            &RpcError::invalid_request("batch call with an empty array."),
        ))),
        Ok(Value::Array(items)) if items.iter().any(Value::is_null) => Some(encode(&Response::error(
            RequestId::Null,
            &RpcError::invalid_request("batch contains null."),
        ))),
        Ok(Value::Array(items)) => {
            let responses: Vec<Response> = items
                .iter()
                .filter_map(|item| handle_request(item, session, client, &mut effects))
                .collect();
            (!responses.is_empty()).then(|| encode(&responses))
        }
        Ok(single) => handle_request(&single, session, client, &mut effects).map(|r| encode(&r)),
    };

    Outcome {
        reply,
        notifications: effects.notifications.iter().map(encode).collect(),
        broadcasts: effects.broadcasts,
        replays: effects.replays,
    }
}

/// Decode and dispatch one request. `None` when nothing must be sent.
fn handle_request(
    value: &Value,
    session: &mut RpcSession,
    client: &ClientId,
    effects: &mut Effects,
) -> Option<Response> {
    let request = match decode_request(value) {
        Ok(request) => request,
        Err(err) => return Some(Response::error(err.id, &err.error)),
    };
    match session.call(&request, client, effects) {
        Ok(result) => (!request.is_notify()).then(|| Response::success(request.response_id(), result)),
        Err(err) => Some(Response::error(request.response_id(), &err)),
    }
}
