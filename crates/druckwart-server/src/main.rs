// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// druckwart-server — reservation service binary.
//
// Opens (or creates) the ledger database, sweeps pending print reservations
// orphaned by a crashed watcher, then serves the reservation API until
// interrupted.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info, warn};

use druckwart_core::config::ServerConfig;
use druckwart_core::error::{DruckwartError, Result};
use druckwart_ledger::Ledger;
use druckwart_server::ReservationServer;

/// Pending reservations older than this at startup belong to a watcher that
/// is no longer running; matches the watcher's job timeout.
const STARTUP_SWEEP_CUTOFF: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "druckwart-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ServerConfig::from_env();
    info!(bind = %config.bind_addr, db = %config.db_path, "druckwart-server starting");

    let mut ledger = Ledger::open(&config.db_path)?;

    let refunded = ledger.refund_stale_pending(STARTUP_SWEEP_CUTOFF)?;
    if !refunded.is_empty() {
        warn!(
            count = refunded.len(),
            ids = ?refunded,
            "refunded pending reservations left by a previous run"
        );
    }

    let bind_addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| DruckwartError::Config(format!("invalid bind address '{}': {e}", config.bind_addr)))?;

    let mut server = ReservationServer::new(bind_addr);
    server
        .start(Arc::new(Mutex::new(ledger)), &config.api_key)
        .await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| DruckwartError::HttpServer(format!("ctrl-c handler: {e}")))?;
    info!("interrupt received");

    server.stop().await
}
