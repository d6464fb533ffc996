// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// druckwart-watch — job watcher binary.
//
// Pauses the configured device queues, then polls them on a fixed interval,
// admitting and settling jobs through the reservation service until
// interrupted.

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use druckwart_core::config::WatchConfig;
use druckwart_core::error::Result;
use druckwart_spool::IppSpooler;
use druckwart_watch::client::ReservationClient;
use druckwart_watch::tracker::JobTracker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "druckwart-watch failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = WatchConfig::from_env()?;
    info!(
        api = %config.api_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        standard = %config.standard_device,
        premium = config.premium_device.as_deref().unwrap_or("(none)"),
        "druckwart-watch starting"
    );

    let client = ReservationClient::new(&config.api_url, &config.api_key)?;
    let mut tracker = JobTracker::new(IppSpooler::new(), client, config.devices());

    // Queues must be paused before the first scan so nothing prints
    // unevaluated.
    tracker.pause_all_devices().await;

    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Awaited inline: cycles never overlap, the next tick is
                // delayed until this one completes.
                tracker.run_cycle().await;
            }
            _ = &mut ctrl_c => {
                info!("interrupt received");
                break;
            }
        }
    }

    if tracker.tracked_count() > 0 {
        // No cleanup on shutdown; the server's startup sweep refunds the
        // pending transactions these jobs leave behind.
        warn!(
            tracked = tracker.tracked_count(),
            "exiting with jobs still in flight; their reservations remain pending"
        );
    }
    info!("druckwart-watch stopped");
    Ok(())
}
