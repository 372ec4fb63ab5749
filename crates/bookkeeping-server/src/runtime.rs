// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for bookkeeping-server.
//!
//! [`BookkeepingRuntime`] owns every task the server runs: the HTTP API and,
//! when a control-system source is configured, the lost runs and
//! environments monitor. Nothing is registered globally; dropping out of
//! [`BookkeepingRuntime::shutdown`] means every task has stopped.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bookkeeping_server::control_client::HttpControlSystemClient;
//! use bookkeeping_server::runtime::BookkeepingRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let persistence = bookkeeping_core::persistence::connect("sqlite::memory:", 1).await?;
//!     let control = HttpControlSystemClient::new("http://control/api/environments", Duration::from_secs(10))?;
//!
//!     let runtime = BookkeepingRuntime::builder()
//!         .persistence(persistence)
//!         .bind_addr("0.0.0.0:4000".parse()?)
//!         .status_source(Arc::new(control))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bookkeeping_core::persistence::Persistence;
use tokio::net::TcpListener;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::api::{AppState, router};
use crate::config::{DEFAULT_HOUSEKEEPING_INTERVAL, DEFAULT_HTTP_PORT, DEFAULT_LOST_THRESHOLD};
use crate::control_client::EnvironmentStatusSource;
use crate::housekeeping::{HousekeepingMonitorConfig, LostRunsAndEnvironmentsMonitor};

/// Builder for creating a [`BookkeepingRuntime`].
pub struct BookkeepingRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    status_source: Option<Arc<dyn EnvironmentStatusSource>>,
    bind_addr: SocketAddr,
    housekeeping_interval: Duration,
    lost_threshold: Duration,
}

impl Default for BookkeepingRuntimeBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            status_source: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
            housekeeping_interval: DEFAULT_HOUSEKEEPING_INTERVAL,
            lost_threshold: DEFAULT_LOST_THRESHOLD,
        }
    }
}

impl BookkeepingRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the control-system source. Enables the housekeeping monitor.
    pub fn status_source(mut self, source: Arc<dyn EnvironmentStatusSource>) -> Self {
        self.status_source = Some(source);
        self
    }

    /// Set the HTTP bind address.
    ///
    /// Default: `0.0.0.0:4000`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the housekeeping monitor period.
    ///
    /// Default: 30 seconds
    pub fn housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = interval;
        self
    }

    /// Set the age after which unreported runs and environments are lost.
    ///
    /// Default: 15 minutes
    pub fn lost_threshold(mut self, threshold: Duration) -> Self {
        self.lost_threshold = threshold;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<BookkeepingRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;

        Ok(BookkeepingRuntimeConfig {
            persistence,
            status_source: self.status_source,
            bind_addr: self.bind_addr,
            housekeeping_interval: self.housekeeping_interval,
            lost_threshold: self.lost_threshold,
        })
    }
}

/// Configuration for a [`BookkeepingRuntime`].
pub struct BookkeepingRuntimeConfig {
    persistence: Arc<dyn Persistence>,
    status_source: Option<Arc<dyn EnvironmentStatusSource>>,
    bind_addr: SocketAddr,
    housekeeping_interval: Duration,
    lost_threshold: Duration,
}

/// Housekeeping monitor task and its shutdown handle.
struct MonitorTask {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl BookkeepingRuntimeConfig {
    /// Start the runtime, spawning the HTTP server and the housekeeping monitor.
    pub async fn start(self) -> Result<BookkeepingRuntime> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let app = router(AppState::new(self.persistence.clone()));
        let (server_shutdown_tx, mut server_shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    while server_shutdown_rx.changed().await.is_ok() {
                        if *server_shutdown_rx.borrow() {
                            break;
                        }
                    }
                    info!("HTTP server received shutdown signal");
                })
                .await?;
            Ok::<(), anyhow::Error>(())
        });

        let monitor = match self.status_source {
            Some(source) => {
                let monitor = LostRunsAndEnvironmentsMonitor::new(
                    self.persistence.clone(),
                    source,
                    HousekeepingMonitorConfig {
                        poll_interval: self.housekeeping_interval,
                        lost_threshold: self.lost_threshold,
                    },
                );
                let shutdown = monitor.shutdown_handle();
                let handle = tokio::spawn(async move {
                    monitor.run().await;
                });
                Some(MonitorTask { handle, shutdown })
            }
            None => {
                debug!("No control system configured; housekeeping monitor disabled");
                None
            }
        };

        info!(
            addr = %local_addr,
            housekeeping = monitor.is_some(),
            "BookkeepingRuntime started"
        );

        Ok(BookkeepingRuntime {
            server_handle,
            server_shutdown_tx,
            monitor,
            local_addr,
        })
    }
}

/// A running bookkeeping server that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct BookkeepingRuntime {
    server_handle: JoinHandle<Result<()>>,
    server_shutdown_tx: watch::Sender<bool>,
    monitor: Option<MonitorTask>,
    local_addr: SocketAddr,
}

impl BookkeepingRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> BookkeepingRuntimeBuilder {
        BookkeepingRuntimeBuilder::new()
    }

    /// Address the HTTP server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the housekeeping monitor was started.
    pub fn housekeeping_enabled(&self) -> bool {
        self.monitor.is_some()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals the HTTP server and the housekeeping monitor to stop, then
    /// waits for both.
    pub async fn shutdown(self) -> Result<()> {
        info!("BookkeepingRuntime shutting down...");

        let _ = self.server_shutdown_tx.send(true);

        if let Some(monitor) = self.monitor {
            monitor.shutdown.notify_one();
            if let Err(e) = monitor.handle.await {
                error!("Housekeeping monitor task panicked: {}", e);
            }
        }

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("BookkeepingRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("BookkeepingRuntime server error during shutdown: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("BookkeepingRuntime server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        let monitor_running = self
            .monitor
            .as_ref()
            .is_none_or(|monitor| !monitor.handle.is_finished());
        !self.server_handle.is_finished() && monitor_running
    }
}
