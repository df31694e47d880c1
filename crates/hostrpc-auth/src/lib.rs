//! # hostrpc-auth
//!
//! Digest challenge/response authentication for the WebSocket handshake.
//!
//! - [`DigestAuthenticator`] issues single-use nonces bound to the peer
//!   address and validates the MD5 response a client sends on reconnect
//! - [`PasswordSource`] supplies the password; [`FilePasswordStore`] reads
//!   it from `~/.hostrpc/auth.json`, written with 0o600 permissions

#![deny(unsafe_code)]

pub mod digest;
pub mod errors;
pub mod storage;

pub use digest::{
    AUTH_PATH, CHALLENGE_CLOSE_CODE, ChallengeBody, Decision, DigestAuthenticator, DigestConfig,
    DigestResponse, Handshake,
};
pub use errors::AuthError;
pub use storage::{FilePasswordStore, PasswordSource, StaticPassword};
