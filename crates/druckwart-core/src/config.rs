// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Environment-driven configuration for the two Druckwart processes.

use std::time::Duration;

use crate::error::{DruckwartError, Result};

/// Shared-secret credential presented as a bearer token on every request to
/// the reservation API. The default is for development only.
const DEFAULT_API_KEY: &str = "druckwart-dev-key-change-in-production";

/// Configuration for the reservation server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `127.0.0.1:7631`.
    pub bind_addr: String,
    /// Bearer credential the watcher must present.
    pub api_key: String,
    /// Path of the SQLite ledger database.
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7631".into(),
            api_key: DEFAULT_API_KEY.into(),
            db_path: "druckwart.db".into(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("DRUCKWART_BIND", &defaults.bind_addr),
            api_key: env_or("DRUCKWART_API_KEY", &defaults.api_key),
            db_path: env_or("DRUCKWART_DB", &defaults.db_path),
        }
    }
}

/// Configuration for the watcher process.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Base URL of the reservation server, e.g. `http://127.0.0.1:7631`.
    pub api_url: String,
    /// Bearer credential for the reservation API.
    pub api_key: String,
    /// Delay between poll cycles.
    pub poll_interval: Duration,
    /// Device URI of the standard-class (monochrome) printer queue.
    pub standard_device: String,
    /// Device URI of the premium-class (colour) printer queue, if any.
    pub premium_device: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:7631".into(),
            api_key: DEFAULT_API_KEY.into(),
            poll_interval: Duration::from_millis(3000),
            standard_device: "ipp://localhost:631/printers/pool-sw".into(),
            premium_device: None,
        }
    }
}

impl WatchConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `DRUCKWART_POLL_INTERVAL_MS` is set but not a
    /// positive integer.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let poll_interval = match std::env::var("DRUCKWART_POLL_INTERVAL_MS") {
            Ok(raw) => {
                let ms: u64 = raw.parse().map_err(|_| {
                    DruckwartError::Config(format!(
                        "DRUCKWART_POLL_INTERVAL_MS must be a positive integer, got '{raw}'"
                    ))
                })?;
                if ms == 0 {
                    return Err(DruckwartError::Config(
                        "DRUCKWART_POLL_INTERVAL_MS must be greater than zero".into(),
                    ));
                }
                Duration::from_millis(ms)
            }
            Err(_) => defaults.poll_interval,
        };

        // Empty string means "no premium device", same as unset.
        let premium_device = std::env::var("DRUCKWART_PRINTER_PREMIUM")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            api_url: env_or("DRUCKWART_API_URL", &defaults.api_url),
            api_key: env_or("DRUCKWART_API_KEY", &defaults.api_key),
            poll_interval,
            standard_device: env_or("DRUCKWART_PRINTER_STANDARD", &defaults.standard_device),
            premium_device,
        })
    }

    /// The configured devices in a stable enumeration order, each paired with
    /// the job class priced for it.
    pub fn devices(&self) -> Vec<(String, crate::types::JobClass)> {
        let mut out = vec![(self.standard_device.clone(), crate::types::JobClass::Standard)];
        if let Some(premium) = &self.premium_device {
            out.push((premium.clone(), crate::types::JobClass::Premium));
        }
        out
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobClass;

    #[test]
    fn default_watch_config_has_single_device() {
        let config = WatchConfig::default();
        let devices = config.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].1, JobClass::Standard);
    }

    #[test]
    fn premium_device_extends_enumeration() {
        let config = WatchConfig {
            premium_device: Some("ipp://localhost:631/printers/pool-farbe".into()),
            ..Default::default()
        };
        let devices = config.devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].1, JobClass::Premium);
    }

    #[test]
    fn default_poll_interval_is_three_seconds() {
        assert_eq!(WatchConfig::default().poll_interval, Duration::from_secs(3));
    }
}
