// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for bookkeeping-server.

use std::net::SocketAddr;
use std::time::Duration;

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 4000;
/// Default period of the housekeeping monitor.
pub const DEFAULT_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);
/// Default age after which unreported runs and environments are lost.
pub const DEFAULT_LOST_THRESHOLD: Duration = Duration::from_secs(15 * 60);
/// Default timeout of control-system requests.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// `postgres://` or `sqlite:` URL.
    pub database_url: String,
    /// HTTP listen address.
    pub http_addr: SocketAddr,
    /// Present when the lost runs/environments monitor is enabled.
    pub housekeeping: Option<HousekeepingConfig>,
}

/// Lost runs and environments monitor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HousekeepingConfig {
    /// Control-system endpoint listing the live environments.
    pub control_url: String,
    pub interval: Duration,
    pub lost_threshold: Duration,
    pub control_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through the given variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("BOOKKEEPING_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .ok_or(ConfigError::MissingEnvVar(
                "BOOKKEEPING_DATABASE_URL or DATABASE_URL",
            ))?;

        let port: u16 = match lookup("BOOKKEEPING_HTTP_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidPort)?,
            None => DEFAULT_HTTP_PORT,
        };
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let housekeeping_enabled = lookup("BOOKKEEPING_HOUSEKEEPING_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let housekeeping = if housekeeping_enabled {
            let control_url =
                lookup("BOOKKEEPING_CONTROL_URL").ok_or(ConfigError::MissingControlUrl)?;
            Some(HousekeepingConfig {
                control_url,
                interval: seconds(
                    &lookup,
                    "BOOKKEEPING_HOUSEKEEPING_INTERVAL_SECS",
                    DEFAULT_HOUSEKEEPING_INTERVAL,
                )?,
                lost_threshold: seconds(
                    &lookup,
                    "BOOKKEEPING_LOST_THRESHOLD_SECS",
                    DEFAULT_LOST_THRESHOLD,
                )?,
                control_timeout: seconds(
                    &lookup,
                    "BOOKKEEPING_CONTROL_TIMEOUT_SECS",
                    DEFAULT_CONTROL_TIMEOUT,
                )?,
            })
        } else {
            None
        };

        Ok(Self {
            database_url,
            http_addr,
            housekeeping,
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidNumber(key)),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// A duration variable is not a positive number of seconds.
    #[error("Invalid number of seconds in {0}")]
    InvalidNumber(&'static str),
    /// Housekeeping is enabled without a control-system URL.
    #[error("BOOKKEEPING_CONTROL_URL is required when housekeeping is enabled")]
    MissingControlUrl,
}
