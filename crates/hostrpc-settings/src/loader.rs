//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HostRpcSettings::default()`]
//! 2. If `~/.hostrpc/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `HOSTRPC_*` environment variable overrides (highest priority)
//! 4. Validate ranges
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::HostRpcSettings;

/// Data directory (`~/.hostrpc`).
pub fn data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hostrpc")
}

/// Resolve the path to the settings file (`~/.hostrpc/settings.json`).
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HostRpcSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or an out-of-range value, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<HostRpcSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

/// [`load_settings_from_path`] with an explicit variable lookup.
pub fn load_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<HostRpcSettings> {
    let defaults = serde_json::to_value(HostRpcSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HostRpcSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject values the server cannot run with.
pub fn validate(settings: &HostRpcSettings) -> Result<()> {
    if settings.server.send_queue_size == 0 {
        return Err(SettingsError::invalid("server.sendQueueSize", "must be at least 1"));
    }
    if settings.server.max_message_size < 1024 {
        return Err(SettingsError::invalid(
            "server.maxMessageSize",
            "must be at least 1024 bytes",
        ));
    }
    if settings.server.heartbeat_timeout_ms <= settings.server.heartbeat_interval_ms {
        return Err(SettingsError::invalid(
            "server.heartbeatTimeoutMs",
            "must be greater than heartbeatIntervalMs",
        ));
    }
    if settings.rpc.max_chain_depth == 0 {
        return Err(SettingsError::invalid("rpc.maxChainDepth", "must be at least 1"));
    }
    if settings.auth.max_challenges == 0 {
        return Err(SettingsError::invalid("auth.maxChallenges", "must be at least 1"));
    }
    Ok(())
}

/// Apply `HOSTRPC_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut HostRpcSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// - Integers must be valid and within the listed range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are logged and ignored
pub fn apply_overrides(settings: &mut HostRpcSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("HOSTRPC_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("HOSTRPC_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("HOSTRPC_MAX_MESSAGE_SIZE", 1024, 256 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.usize("HOSTRPC_SEND_QUEUE_SIZE", 1, 1_000_000) {
        settings.server.send_queue_size = v;
    }
    if let Some(v) = env.u64("HOSTRPC_HEARTBEAT_INTERVAL", 1000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("HOSTRPC_HEARTBEAT_TIMEOUT", 1000, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }

    // ── RPC ─────────────────────────────────────────────────────────
    if let Some(v) = env.u64("HOSTRPC_REPLAY_DELAY_MS", 0, 10_000) {
        settings.rpc.replay_delay_ms = v;
    }
    if let Some(v) = env.usize("HOSTRPC_MAX_CHAIN_DEPTH", 1, 32) {
        settings.rpc.max_chain_depth = v;
    }
    if let Some(v) = env.bool("HOSTRPC_ABBREVIATED_NAMES") {
        settings.rpc.abbreviated_method_names = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.bool("HOSTRPC_AUTH") {
        settings.auth.enabled = v;
    }
    if let Some(v) = env.string("HOSTRPC_PASSWORD_FILE") {
        settings.auth.password_file = Some(PathBuf::from(v));
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("HOSTRPC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("HOSTRPC_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid {kind} env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "boolean", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
