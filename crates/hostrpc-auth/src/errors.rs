//! Auth error types.

/// Errors raised while reading or writing the password file.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The password file holds no password.
    #[error("no password configured in {0}")]
    NotConfigured(String),
}
