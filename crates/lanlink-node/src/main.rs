//! LAN-Link node entry point.
//!
//! ```text
//! main()
//!  └─ load config            -- CLI path or LANLINK_CONFIG, else the platform path
//!  └─ ConnectionCoordinator  -- discovery socket + at most one stream
//!  └─ PeerResponder          -- only for `role = "responder"`
//!  └─ event loop             -- logs LinkEvents until Ctrl-C
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lanlink_node::application::{ConnectionCoordinator, LinkEvent};
use lanlink_node::infrastructure::network::responder::{PeerResponder, ResponderSettings};
use lanlink_node::infrastructure::storage::config::{self, AppConfig, NodeRole};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LAN-Link node: discovers a peer over UDP broadcast and hands off to TCP.
#[derive(Debug, Parser)]
#[command(name = "lanlink-node", version)]
struct Cli {
    /// Path to a TOML config file.  When omitted, the platform config file is
    /// used if present.  A path given here must exist.
    #[arg(value_name = "CONFIG", env = "LANLINK_CONFIG")]
    config: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // An explicit path that cannot be read is fatal; the platform file falls
    // back to defaults.
    let (config, config_error) = match cli.config.as_deref() {
        Some(path) => (load_explicit(path)?, None),
        None => match config::load_config() {
            Ok(config) => (config, None),
            Err(e) => (AppConfig::default(), Some(e)),
        },
    };

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.node.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(e) = config_error {
        warn!("using default configuration: {e}");
    }
    info!("LAN-Link node starting as {}", config.node.role);

    let (coordinator, mut events) =
        ConnectionCoordinator::from_config(&config).context("invalid configuration")?;
    let discovery_addr = coordinator
        .start()
        .await
        .context("failed to start discovery channel")?;
    info!("discovery channel bound on UDP {discovery_addr}");

    let responder = match config.node.role {
        NodeRole::Responder => {
            let settings = ResponderSettings::from_config(&config.responder)
                .context("invalid responder configuration")?;
            let responder = PeerResponder::bind(settings)
                .await
                .context("failed to start responder")?;
            responder
                .start_announcing(coordinator.datagram())
                .context("failed to schedule announcements")?;
            Some(responder)
        }
        NodeRole::Seeker => None,
    };

    info!("LAN-Link node ready.  Press Ctrl-C to exit.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("failed to listen for Ctrl-C: {e}");
                }
                info!("shutdown signal received");
                break;
            }
        }
    }

    if let Some(responder) = responder {
        responder.stop();
    }
    coordinator.stop();
    info!("LAN-Link node stopped");
    Ok(())
}

fn load_explicit(path: &Path) -> anyhow::Result<AppConfig> {
    config::load_config_file(path).with_context(|| format!("failed to load {}", path.display()))
}

fn log_event(event: &LinkEvent) {
    match event {
        LinkEvent::Discovered(endpoint) => info!("peer announced {endpoint}"),
        LinkEvent::Connected(endpoint) => info!("linked to {endpoint}"),
        LinkEvent::ConnectionFailed { endpoint, failure } => {
            warn!("link to {endpoint} lost: {failure} (code {})", failure.code())
        }
        LinkEvent::PeerMessage(line) => info!("peer says: {line}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
