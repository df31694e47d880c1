//! # hostrpc-rpc
//!
//! JSON-RPC 2.0 protocol layer over a [`hostrpc_registry::Registry`].
//!
//! - Wire types: responses, server-pushed notifications, error codes
//! - Request decoding with per-argument kind detection
//! - Built-in `rpc` module: subscriptions, echo, broadcast, report, config
//! - Session dispatch: built-ins first, then graph nodes, then the vararg
//!   forms of both
//! - Message handling with batches and notify-style requests

#![deny(unsafe_code)]

pub mod adapter;
pub mod builtins;
pub mod context;
pub mod errors;
pub mod handler;
pub mod session;
pub mod test_module;
pub mod types;

pub use adapter::{DecodeError, decode_params, decode_request, element_kind, unwrap_single_array};
pub use builtins::{BuiltinMethod, BuiltinRegistry};
pub use context::{CallContext, Effects};
pub use errors::RpcError;
pub use handler::{Outcome, encode, handle_message};
pub use session::{RpcSession, Target};
pub use types::{ErrorBody, JSONRPC_VERSION, Notification, Request, RequestId, Response};
