//! # pose-relay
//!
//! Pose relay binary: resolves settings, initializes logging and metrics,
//! and runs the WebSocket relay until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_logging::LogFormat;
use relay_server::{EchoPolicy, RelayConfig, RelayMode, RelayServer, ServerConfig};
use relay_settings::{PoseRelaySettings, RelayModeSetting};
use tracing::info;

/// WebSocket relay for pose/joint payloads.
#[derive(Parser, Debug)]
#[command(name = "pose-relay", about = "WebSocket relay for pose/joint payloads")]
struct Cli {
    /// Settings file (default `~/.pose-relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Relay mode: `immediate` or `debounced`.
    #[arg(long, value_parser = parse_mode)]
    mode: Option<RelayModeSetting>,

    /// Debounce window in milliseconds.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Do not echo a payload back to the connection that sent it.
    #[arg(long)]
    exclude_sender: bool,

    /// Maximum concurrent connections.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

fn parse_mode(val: &str) -> std::result::Result<RelayModeSetting, String> {
    RelayModeSetting::parse(val).ok_or_else(|| format!("unknown relay mode '{val}' (expected immediate or debounced)"))
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut PoseRelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(mode) = self.mode {
            settings.relay.mode = mode;
        }
        if let Some(ms) = self.debounce_ms {
            settings.relay.debounce_ms = ms;
        }
        if self.exclude_sender {
            settings.relay.echo_to_sender = false;
        }
        if let Some(n) = self.max_connections {
            settings.server.max_connections = n;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

/// Translate resolved settings into the server's runtime config.
fn server_config(settings: &PoseRelaySettings) -> ServerConfig {
    let mode = match settings.relay.mode {
        RelayModeSetting::Immediate => RelayMode::Immediate,
        RelayModeSetting::Debounced => RelayMode::Debounced {
            window_ms: settings.relay.debounce_ms,
        },
    };
    let echo = if settings.relay.echo_to_sender {
        EchoPolicy::IncludeSender
    } else {
        EchoPolicy::ExcludeSender
    };
    ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        max_connections: settings.server.max_connections,
        max_message_size: settings.server.max_message_size,
        send_queue_capacity: settings.server.send_queue_capacity,
        heartbeat_interval_ms: settings.server.heartbeat_interval_ms,
        heartbeat_timeout_ms: settings.server.heartbeat_timeout_ms,
        relay: RelayConfig { mode, echo },
    }
}

fn log_format(settings: &PoseRelaySettings) -> LogFormat {
    if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings first: the log level comes from them.
    let settings_path = args.config.clone().unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid configuration")?;

    relay_logging::init_subscriber(&settings.logging.level, log_format(&settings));

    let metrics = relay_server::metrics::install_recorder()?;
    let config = server_config(&settings);

    let running = RelayServer::new(config)
        .with_metrics(metrics)
        .listen()
        .await
        .context("Failed to start relay server")?;

    info!("pose relay listening on ws://{}", running.addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("shutting down...");
    running.stop().await;
    info!("shutdown complete");
    Ok(())
}
