//! sniproom daemon - ephemeral snippet-sharing rooms
//!
//! This binary runs the room server: clients connect over TCP, create and
//! join rooms, and exchange code snippets and comment threads in realtime.
//! Rooms expire on a per-room clock and are swept once a minute.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default address (127.0.0.1:5000)
//! sniproomd
//!
//! # Start on a custom address
//! sniproomd --listen 0.0.0.0:7000
//! SNIPROOM_ADDR=0.0.0.0:7000 sniproomd
//!
//! # Enable debug logging
//! RUST_LOG=sniproomd=debug sniproomd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::env;
use std::process;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sniproomd::registry::spawn_registry;
use sniproomd::server::{RoomServer, DEFAULT_LISTEN_ADDR};

/// sniproom daemon - ephemeral snippet-sharing rooms
#[derive(Parser, Debug)]
#[command(name = "sniproomd", version, about)]
struct Args {
    /// Address to listen on (falls back to SNIPROOM_ADDR, then the default)
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sniproomd=info".parse()?)
                .add_directive("sniproom_core=info".parse()?)
                .add_directive("sniproom_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "sniproom daemon starting"
    );

    let listen_addr = args
        .listen
        .or_else(|| env::var("SNIPROOM_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Spawn the room registry and its expiry sweep
    let registry = spawn_registry();
    info!("Room registry started");

    // Bind and run the server
    let server = RoomServer::bind(&listen_addr, registry, cancel_token).await?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("sniproom daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
