//! JSON-RPC 2.0 wire types.

use hostrpc_registry::{EventPayload, ParamKind};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::errors::RpcError;

/// Protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier: string, number, or explicit `null`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(serde_json::Number),
    /// String id.
    String(String),
    /// `null`, also used when the id is unknown.
    #[default]
    Null,
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// A decoded request.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// Echoed id; `None` for notify-style requests.
    pub id: Option<RequestId>,
    /// Dotted method name.
    pub method: String,
    /// Positional arguments (named params become one object).
    pub params: Vec<Value>,
    /// Detected kind of each argument.
    pub kinds: Vec<ParamKind>,
}

impl Request {
    /// Whether the caller expects no response.
    pub fn is_notify(&self) -> bool {
        self.id.is_none()
    }

    /// Id to echo in a response.
    pub fn response_id(&self) -> RequestId {
        self.id.clone().unwrap_or_default()
    }
}

/// Error object inside a response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric code.
    pub code: i32,
    /// Short text of the code.
    pub message: String,
    /// Detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response.
///
/// Serializes `error` when present, otherwise `result` (as `null` when
/// there is none). `id` is always written.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Call result.
    #[serde(default)]
    pub result: Option<Value>,
    /// Call error.
    #[serde(default)]
    pub error: Option<ErrorBody>,
    /// Echoed id.
    #[serde(default)]
    pub id: RequestId,
}

impl Response {
    /// Successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Error response.
    pub fn error(id: RequestId, error: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: None,
            error: Some(error.to_error_body()),
            id,
        }
    }

    /// Whether the response carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", &self.jsonrpc)?;
        match &self.error {
            Some(error) => map.serialize_entry("error", error)?,
            None => map.serialize_entry("result", self.result.as_ref().unwrap_or(&Value::Null))?,
        }
        map.serialize_entry("id", &self.id)?;
        map.end()
    }
}

/// Server-pushed notification.
///
/// Encodes as `{"notification": name, "params": ...}`. Empty params are
/// omitted; a single object parameter is written as that object.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Event or broadcast name.
    pub notification: String,
    /// Parameters.
    pub params: Vec<Value>,
}

impl Notification {
    /// Create a notification.
    pub fn new(notification: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            notification: notification.into(),
            params,
        }
    }
}

impl From<EventPayload> for Notification {
    fn from(payload: EventPayload) -> Self {
        Self::new(payload.event, payload.params)
    }
}

impl Serialize for Notification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("notification", &self.notification)?;
        match self.params.as_slice() {
            [] => {}
            [single @ Value::Object(_)] => map.serialize_entry("params", single)?,
            params => map.serialize_entry("params", params)?,
        }
        map.end()
    }
}
