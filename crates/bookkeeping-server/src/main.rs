// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bookkeeping Server - run bookkeeping HTTP API
//!
//! An HTTP server responsible for:
//! - Runs (registration, definition, quality and calibration updates)
//! - Environments and LHC fills
//! - Housekeeping of runs and environments lost by the control system

use std::sync::Arc;
use tracing::{info, warn};

use bookkeeping_server::config::Config;
use bookkeeping_server::control_client::HttpControlSystemClient;
use bookkeeping_server::runtime::BookkeepingRuntime;

const MAX_DB_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookkeeping_server=info,bookkeeping_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        housekeeping = config.housekeeping.is_some(),
        "Starting Bookkeeping Server"
    );

    // Connect and bring the schema up to date
    let persistence =
        bookkeeping_core::persistence::connect(&config.database_url, MAX_DB_CONNECTIONS).await?;

    info!("Connected to database");

    let mut builder = BookkeepingRuntime::builder()
        .persistence(persistence)
        .bind_addr(config.http_addr);

    if let Some(housekeeping) = &config.housekeeping {
        let client =
            HttpControlSystemClient::new(&housekeeping.control_url, housekeeping.control_timeout)?;
        info!(control_url = %client.url(), "Housekeeping enabled");
        builder = builder
            .status_source(Arc::new(client))
            .housekeeping_interval(housekeeping.interval)
            .lost_threshold(housekeeping.lost_threshold);
    }

    let runtime = builder.build()?.start().await?;

    info!(addr = %runtime.local_addr(), "Bookkeeping server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Bookkeeping Server shut down");

    Ok(())
}
