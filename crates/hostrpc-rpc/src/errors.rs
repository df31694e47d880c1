//! JSON-RPC error codes and error type.

use serde_json::Value;

use crate::types::ErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Malformed JSON.
pub const PARSE_ERROR: i32 = -32700;
/// Structurally invalid request envelope.
pub const INVALID_REQUEST: i32 = -32600;
/// No method matches the name and argument kinds.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Parameters of an unsupported shape.
pub const INVALID_PARAMS: i32 = -32602;
/// Invocation failed.
pub const INTERNAL_ERROR: i32 = -32603;
/// Transport-level failure.
pub const SERVER_ERROR: i32 = -32000;

/// Short wire message for a code.
pub const fn message_for(code: i32) -> &'static str {
    match code {
        PARSE_ERROR => "Parse error",
        INVALID_REQUEST => "Invalid Request",
        METHOD_NOT_FOUND => "Method not found",
        INVALID_PARAMS => "Invalid Params",
        INTERNAL_ERROR => "Internal error",
        _ => "Server error",
    }
}

/// Error produced while decoding or dispatching a request.
///
/// The variant fixes the code; the message travels in the error's `data`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Text was not JSON.
    #[error("{message}")]
    Parse {
        /// Detail.
        message: String,
    },
    /// Envelope is wrong.
    #[error("{message}")]
    InvalidRequest {
        /// Detail.
        message: String,
    },
    /// No dispatch match.
    #[error("{message}")]
    MethodNotFound {
        /// Detail.
        message: String,
    },
    /// Parameters of an unsupported shape.
    #[error("{message}")]
    InvalidParams {
        /// Detail.
        message: String,
    },
    /// Invocation failure.
    #[error("{message}")]
    Internal {
        /// Detail.
        message: String,
    },
    /// Transport failure.
    #[error("{message}")]
    Server {
        /// Detail.
        message: String,
    },
}

impl RpcError {
    /// Invalid request with a detail message.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Invalid params with a detail message.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Method-not-found for `name`.
    pub fn method_not_found(name: &str) -> Self {
        Self::MethodNotFound {
            message: format!("'{name}' method not found."),
        }
    }

    /// Internal error with a detail message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Numeric JSON-RPC code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::Server { .. } => SERVER_ERROR,
        }
    }

    /// Label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::InvalidParams { .. } => "invalid_params",
            Self::Internal { .. } => "internal_error",
            Self::Server { .. } => "server_error",
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> ErrorBody {
        let detail = self.to_string();
        ErrorBody {
            code: self.code(),
            message: message_for(self.code()).to_owned(),
            data: (!detail.is_empty()).then(|| Value::String(detail)),
        }
    }
}
