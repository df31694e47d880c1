//! Registry error types.

use thiserror::Error;

/// Errors that abort registry construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// An accessor chain exceeded the depth limit.
    #[error("accessor chain '{path}' exceeds maximum depth {max}")]
    ChainTooDeep {
        /// Absolute name of the node that would exceed the limit.
        path: String,
        /// Configured limit.
        max: usize,
    },
    /// A method or module referenced a type missing from the catalog.
    #[error("unknown host type '{0}'")]
    UnknownType(String),
    /// Two modules share a name.
    #[error("module '{0}' registered twice")]
    DuplicateModule(String),
}

/// Errors raised while invoking a node or managing its subscriptions.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvokeError {
    /// The host failed this call.
    #[error("{0}")]
    Host(String),
    /// The node failed to build and stays failed.
    #[error("{0}")]
    Sticky(String),
    /// Fewer arguments than the accessor chain consumes.
    #[error("'{name}' expects {expected} argument(s), got {got}")]
    Arity {
        /// Absolute node name.
        name: String,
        /// Arguments the chain needs.
        expected: usize,
        /// Arguments supplied.
        got: usize,
    },
    /// An ancestor accessor returned something that is not an object.
    #[error("'{0}' did not return a host object")]
    NotAnObject(String),
    /// No event with this name.
    #[error("Event not found")]
    EventNotFound(String),
}
