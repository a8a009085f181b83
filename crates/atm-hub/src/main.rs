//! ATM hub: entry point.
//!
//! Accepts WebSocket connections from ATM terminals, decodes their binary
//! request envelopes and hands each request to the queue for its business
//! endpoint.  Hub-originated messages fan out to every connected terminal
//! through the broadcast publisher.
//!
//! The endpoint receivers and the response sender built here are where the
//! business backend attaches.  Until one is attached, requests are only
//! logged and no response is ever published.
//!
//! # Usage
//!
//! ```text
//! atm-hub [OPTIONS]
//!
//! Options:
//!   --config <PATH>          TOML configuration file
//!   --bind <IP>              Listener IP address [default: 0.0.0.0]
//!   --port <PORT>            Listener port [default: 8025]
//!   --queue-capacity <N>     Slots per endpoint queue [default: 256]
//!   --outbound-capacity <N>  Frames queued per terminal [default: 64]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                    | Description                |
//! |-----------------------------|----------------------------|
//! | `ATM_HUB_CONFIG`            | TOML configuration file    |
//! | `ATM_HUB_BIND`              | Listener IP address        |
//! | `ATM_HUB_PORT`              | Listener port              |
//! | `ATM_HUB_QUEUE_CAPACITY`    | Slots per endpoint queue   |
//! | `ATM_HUB_OUTBOUND_CAPACITY` | Frames queued per terminal |
//!
//! Command-line values win over the configuration file, which wins over the
//! built-in defaults.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use atm_core::protocol::{AtmMessage, BinaryCodec};
use atm_hub::application::{CommandRouter, ConnectionRegistry, LifecycleController};
use atm_hub::domain::HubConfig;
use atm_hub::infrastructure::{
    forward_responses, load_config_file, queue_endpoints, run_server, EndpointReceivers,
    HubFileConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Real-time WebSocket hub for ATM terminals.
#[derive(Debug, Parser)]
#[command(
    name = "atm-hub",
    about = "Real-time WebSocket hub connecting ATM terminals to their business endpoints",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "ATM_HUB_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept terminals on any interface.
    #[arg(long, env = "ATM_HUB_BIND")]
    bind: Option<String>,

    /// TCP port for the WebSocket server.
    #[arg(long, env = "ATM_HUB_PORT")]
    port: Option<u16>,

    /// Number of requests each endpoint queue holds before rejecting.
    #[arg(long, env = "ATM_HUB_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Number of frames each terminal may have waiting before sends to it
    /// fail.
    #[arg(long, env = "ATM_HUB_OUTBOUND_CAPACITY")]
    outbound_capacity: Option<usize>,
}

impl Cli {
    /// Merges the configuration file (if any) with the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed,
    /// or if the merged values are invalid.
    fn into_hub_config(self) -> anyhow::Result<HubConfig> {
        let mut file = match &self.config {
            Some(path) => load_config_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => HubFileConfig::default(),
        };

        if let Some(bind) = self.bind {
            file.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            file.server.port = port;
        }
        if let Some(capacity) = self.queue_capacity {
            file.endpoints.queue_capacity = capacity;
        }
        if let Some(capacity) = self.outbound_capacity {
            file.server.outbound_queue_capacity = capacity;
        }

        file.into_hub_config().context("invalid hub configuration")
    }
}

// ── Backend drains ────────────────────────────────────────────────────────────

/// Logs every request that reaches an endpoint queue.
///
/// The business backend runs outside this process; until it is attached the
/// hub only records what it would have forwarded.
fn spawn_backend_drains(receivers: EndpointReceivers) {
    let EndpointReceivers {
        validate_card,
        validate_pin,
        deposit,
        withdraw,
        inquiry,
    } = receivers;
    tokio::spawn(drain("validate-card", validate_card, AtmMessage::ValidateCardRequest));
    tokio::spawn(drain("validate-pin", validate_pin, AtmMessage::ValidatePinRequest));
    tokio::spawn(drain("deposit", deposit, AtmMessage::DepositRequest));
    tokio::spawn(drain("withdraw", withdraw, AtmMessage::WithdrawRequest));
    tokio::spawn(drain("inquiry", inquiry, AtmMessage::InquiryRequest));
}

async fn drain<P>(name: &'static str, mut rx: mpsc::Receiver<P>, wrap: fn(P) -> AtmMessage) {
    while let Some(request) = rx.recv().await {
        info!("{name} endpoint received {}", wrap(request).summary());
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_hub_config()?;

    info!(
        "ATM hub starting: bind={}, endpoint queue capacity={}, outbound capacity={}",
        config.bind_addr, config.endpoint_queue_capacity, config.outbound_queue_capacity
    );

    // ── Composition root ──────────────────────────────────────────────────────
    let registry = Arc::new(ConnectionRegistry::new());
    let (handlers, receivers) = queue_endpoints(config.endpoint_queue_capacity);
    spawn_backend_drains(receivers);
    let controller = Arc::new(LifecycleController::new(
        registry,
        CommandRouter::new(handlers),
        Arc::new(BinaryCodec),
    ));
    let (responses, responses_rx) = mpsc::channel(config.endpoint_queue_capacity.get());
    tokio::spawn(forward_responses(responses_rx, controller.publisher()));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, controller, running).await?;
    drop(responses);

    info!("ATM hub stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
