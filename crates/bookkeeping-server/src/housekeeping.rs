// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker closing runs and environments the control system lost.
//!
//! Every tick fetches the control system's environment list and hands it to
//! [`LostRunsAndEnvironments`]. Environments and runs are reconciled
//! independently: a failure in one step is logged and does not stop the
//! other, and the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use bookkeeping_core::persistence::Persistence;
use bookkeeping_core::reconciliation::LostRunsAndEnvironments;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::config::{DEFAULT_HOUSEKEEPING_INTERVAL, DEFAULT_LOST_THRESHOLD};
use crate::control_client::EnvironmentStatusSource;
use crate::error::Result;

/// Configuration for the lost runs and environments monitor.
#[derive(Debug, Clone)]
pub struct HousekeepingMonitorConfig {
    /// How often to reconcile.
    pub poll_interval: Duration,
    /// Age after which unreported runs and environments are lost.
    pub lost_threshold: Duration,
}

impl Default for HousekeepingMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_HOUSEKEEPING_INTERVAL,
            lost_threshold: DEFAULT_LOST_THRESHOLD,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub environments_lost: u64,
    pub runs_closed: u64,
}

/// Background worker reconciling local state with the control system.
pub struct LostRunsAndEnvironmentsMonitor {
    reconciliation: LostRunsAndEnvironments,
    source: Arc<dyn EnvironmentStatusSource>,
    config: HousekeepingMonitorConfig,
    shutdown: Arc<Notify>,
}

impl LostRunsAndEnvironmentsMonitor {
    /// Create a new monitor.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        source: Arc<dyn EnvironmentStatusSource>,
        config: HousekeepingMonitorConfig,
    ) -> Self {
        Self {
            reconciliation: LostRunsAndEnvironments::new(persistence, config.lost_threshold),
            source,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the monitor loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            lost_threshold_secs = self.config.lost_threshold.as_secs(),
            "Lost runs and environments monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Lost runs and environments monitor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!(error = %e, "Failed to fetch control system environments");
                    }
                }
            }
        }

        info!("Lost runs and environments monitor stopped");
    }

    /// Run one reconciliation pass at `now`.
    ///
    /// Only a failure to reach the control system is returned; storage
    /// errors of either step are logged and reported as zero changes.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<HousekeepingReport> {
        let snapshot = self.source.snapshot().await?;
        let mut report = HousekeepingReport::default();

        match self
            .reconciliation
            .reconcile_environments(&snapshot, now)
            .await
        {
            Ok(changed) => report.environments_lost = changed,
            Err(e) => error!(error = %e, "Failed to reconcile lost environments"),
        }

        match self.reconciliation.reconcile_runs(&snapshot, now).await {
            Ok(closed) => report.runs_closed = closed,
            Err(e) => error!(error = %e, "Failed to reconcile lost runs"),
        }

        debug!(
            environments_lost = report.environments_lost,
            runs_closed = report.runs_closed,
            "Housekeeping pass finished"
        );
        Ok(report)
    }
}
