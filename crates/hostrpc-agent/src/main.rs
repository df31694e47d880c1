//! # hostrpc-agent
//!
//! Server binary: loads settings, builds the simulated host graph and its
//! registry, and serves it over WebSocket JSON-RPC until ctrl-c.

#![deny(unsafe_code)]

mod sim;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hostrpc_auth::{DigestAuthenticator, DigestConfig, FilePasswordStore};
use hostrpc_logging::{LogFormat, LogLevel};
use hostrpc_registry::RegistryBuilder;
use hostrpc_rpc::{BuiltinRegistry, RpcSession, test_module};
use hostrpc_server::{HostRpcServer, ServerConfig, SessionQueue};
use hostrpc_settings::HostRpcSettings;

use crate::sim::SimulatedHost;

/// Host RPC server.
#[derive(Parser, Debug)]
#[command(name = "hostrpc-agent", about = "WebSocket JSON-RPC server for a host object graph")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.hostrpc/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Require the digest handshake.
    #[arg(long)]
    auth: bool,

    /// Password file for the digest handshake.
    #[arg(long)]
    password_file: Option<PathBuf>,

    /// Store a new password in the password file and exit.
    #[arg(long, value_name = "PASSWORD")]
    set_password: Option<String>,
}

impl Cli {
    /// Fold command-line overrides into `settings`.
    fn apply(&self, settings: &mut HostRpcSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.auth {
            settings.auth.enabled = true;
        }
        if let Some(path) = &self.password_file {
            settings.auth.password_file = Some(path.clone());
        }
    }
}

/// Build the registry for `host` and wrap it in a session.
fn build_session(
    settings: &HostRpcSettings,
    host: &SimulatedHost,
    queue: &SessionQueue,
) -> Result<RpcSession> {
    let mut catalog = SimulatedHost::catalog();
    test_module::register_schema(&mut catalog);

    let mut builder = RegistryBuilder::new(catalog)
        .max_depth(settings.rpc.max_chain_depth)
        .abbreviated_names(settings.rpc.abbreviated_method_names)
        .change_sink(queue.change_sink());
    for module in host.modules() {
        builder = builder.module(module);
    }
    let registry = builder
        .module(test_module::module())
        .build()
        .context("Failed to build registry")?;

    Ok(RpcSession::new(registry, BuiltinRegistry::with_defaults())
        .with_config(hostrpc_settings::public_view(settings)))
}

/// Digest authenticator backed by the configured password file.
fn build_authenticator(settings: &HostRpcSettings) -> Arc<DigestAuthenticator> {
    let store = FilePasswordStore::new(settings.auth.password_path());
    if let Err(err) = store.require_password() {
        tracing::warn!(error = %err, "auth enabled without a password, every handshake will fail");
    }
    let config = DigestConfig {
        username: settings.auth.username.clone(),
        realm: settings.auth.realm.clone(),
        challenge_ttl: settings.auth.challenge_ttl(),
        max_challenges: settings.auth.max_challenges,
    };
    Arc::new(DigestAuthenticator::new(config, Arc::new(store)))
}

fn load(cli: &Cli) -> Result<HostRpcSettings> {
    let mut settings = match &cli.settings {
        Some(path) => hostrpc_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => hostrpc_settings::load_settings().context("Failed to load settings")?,
    };
    cli.apply(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    if let Some(password) = &cli.set_password {
        let store = FilePasswordStore::new(settings.auth.password_path());
        store
            .set_password(password)
            .context("Failed to store password")?;
        println!("password stored in {}", store.path().display());
        return Ok(());
    }

    hostrpc_logging::init_subscriber(
        LogLevel::from_str_lossy(&settings.logging.level),
        LogFormat::from_json_flag(settings.logging.json),
    );

    let metrics = hostrpc_server::metrics::install_recorder().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "metrics recorder unavailable, /metrics will be empty");
        hostrpc_server::metrics::detached_handle()
    });

    let host = SimulatedHost::new(&settings.host);
    let (queue, inbox) = SessionQueue::channel();
    let session = build_session(&settings, &host, &queue)?;

    let mut server = HostRpcServer::new(
        ServerConfig::from_settings(&settings),
        session,
        queue,
        inbox,
        metrics,
    );
    if settings.auth.enabled {
        server = server.with_auth(build_authenticator(&settings));
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    let stats = server.stats();
    tracing::info!(
        "hostrpc listening on ws://{addr} ({} methods, {} events)",
        stats.methods(),
        stats.events()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostrpc_auth::{Decision, Handshake};
    use std::net::{IpAddr, Ipv4Addr};

    // ── CLI ─────────────────────────────────────────────────────────

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["hostrpc-agent"]);
        let mut settings = HostRpcSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, HostRpcSettings::default());
    }

    #[test]
    fn cli_overrides_server_and_logging() {
        let cli = Cli::parse_from([
            "hostrpc-agent",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--log-level",
            "debug",
        ]);
        let mut settings = HostRpcSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn cli_auth_flags() {
        let cli = Cli::parse_from([
            "hostrpc-agent",
            "--auth",
            "--password-file",
            "/tmp/auth.json",
        ]);
        let mut settings = HostRpcSettings::default();
        cli.apply(&mut settings);
        assert!(settings.auth.enabled);
        assert_eq!(settings.auth.password_path(), PathBuf::from("/tmp/auth.json"));
    }

    #[test]
    fn cli_set_password() {
        let cli = Cli::parse_from(["hostrpc-agent", "--set-password", "hunter2"]);
        assert_eq!(cli.set_password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn load_reads_explicit_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9100}}"#).unwrap();
        let cli = Cli::parse_from([
            "hostrpc-agent",
            "--settings",
            path.to_str().unwrap(),
            "--host",
            "127.0.0.2",
        ]);
        let settings = load(&cli).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "127.0.0.2");
    }

    // ── Wiring ──────────────────────────────────────────────────────

    #[test]
    fn session_exposes_host_and_test_modules() {
        let settings = HostRpcSettings::default();
        let host = SimulatedHost::new(&settings.host);
        let (queue, _inbox) = SessionQueue::channel();
        let session = build_session(&settings, &host, &queue).unwrap();
        let modules = session.registry().module_names();
        for name in ["transport", "mainTrackBank", "sceneBank", "application", "test"] {
            assert!(modules.contains(&name), "missing module {name}");
        }
        assert!(session.registry().event_count() > 0);
    }

    #[test]
    fn abbreviated_names_setting_reaches_the_registry() {
        let mut settings = HostRpcSettings::default();
        settings.rpc.abbreviated_method_names = true;
        let host = SimulatedHost::new(&settings.host);
        let (queue, _inbox) = SessionQueue::channel();
        let session = build_session(&settings, &host, &queue).unwrap();
        let registry = session.registry();
        assert!(registry.event_id("tp.playing").is_some());
        assert!(registry.event_id("transport.isPlaying").is_none());
        assert!(registry.identifiers().any(|i| i.name() == "tp.play"));
        assert!(registry.identifiers().any(|i| i.name() == "tp.tempo"));
        assert!(!registry.identifiers().any(|i| i.name().starts_with("transport.")));
        assert!(registry.identifiers().any(|i| i.name() == "test.sum"));
    }

    #[test]
    fn authenticator_uses_password_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        FilePasswordStore::new(&path).set_password("secret").unwrap();

        let mut settings = HostRpcSettings::default();
        settings.auth.enabled = true;
        settings.auth.password_file = Some(path);
        let auth = build_authenticator(&settings);
        assert_eq!(auth.config().username, settings.auth.username);

        let handshake = Handshake {
            path: "/auth",
            query: None,
            host: Some("localhost:8887"),
            remote: IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        assert_eq!(auth.authenticate(&handshake), Decision::Challenge);
        assert!(auth.challenge(&handshake).is_some());
        assert_eq!(auth.pending(), 1);
    }
}
