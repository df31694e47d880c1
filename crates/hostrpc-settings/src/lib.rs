//! # hostrpc-settings
//!
//! Configuration for the host RPC server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HostRpcSettings::default()`]
//! 2. **User file**: `~/.hostrpc/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HOSTRPC_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, data_dir, deep_merge, load_settings, load_settings_from_path, load_with,
    settings_path,
};
pub use types::*;

/// Settings rendered for clients, without anything secret.
pub fn public_view(settings: &HostRpcSettings) -> serde_json::Value {
    let mut value = serde_json::to_value(settings).unwrap_or_default();
    if let Some(auth) = value.get_mut("auth").and_then(serde_json::Value::as_object_mut) {
        let _ = auth.remove("passwordFile");
    }
    value
}
