// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lost runs and environments reconciliation.
//!
//! The control system reports the environments it still knows about, each
//! with its current run. Local environments and open runs it stopped
//! reporting, and that are older than the lost threshold, are closed here:
//!
//! - environments move to `ERROR` with [`LOST_ENVIRONMENT_MESSAGE`] and are
//!   torn down,
//! - runs get their O2 end (and trigger end when the trigger started) set.
//!
//! A second pass over the same snapshot changes nothing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::EnvironmentStatus;
use crate::persistence::{EnvironmentRecord, Persistence, RunQuery, RunRecord};

/// Status message of environments declared lost.
pub const LOST_ENVIRONMENT_MESSAGE: &str =
    "Environment lost: no longer reported by the control system";

/// An environment as reported by the control system.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedEnvironment {
    pub id: String,
    #[serde(default)]
    pub current_run_number: Option<i64>,
}

/// Everything the control system currently reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ControlSystemSnapshot {
    #[serde(default)]
    pub environments: Vec<ReportedEnvironment>,
}

impl ControlSystemSnapshot {
    fn environment_ids(&self) -> HashSet<&str> {
        self.environments.iter().map(|env| env.id.as_str()).collect()
    }

    fn current_run_numbers(&self) -> HashSet<i64> {
        self.environments
            .iter()
            .filter_map(|env| env.current_run_number)
            .collect()
    }
}

/// Ids of the active environments that are lost.
///
/// An environment is lost when it is not terminal, was created before
/// `cutoff` and the snapshot does not list it. Unknown statuses are left
/// alone.
pub fn lost_environment_ids(
    active: &[EnvironmentRecord],
    snapshot: &ControlSystemSnapshot,
    cutoff: DateTime<Utc>,
) -> Vec<String> {
    let reported = snapshot.environment_ids();
    active
        .iter()
        .filter(|env| env.toredown_at.is_none())
        .filter(|env| {
            env.status
                .parse::<EnvironmentStatus>()
                .is_ok_and(|status| !status.is_terminal())
        })
        .filter(|env| env.created_at < cutoff)
        .filter(|env| !reported.contains(env.id.as_str()))
        .map(|env| env.id.clone())
        .collect()
}

/// Ids of the open runs that are lost.
///
/// A run is lost when it never ended, started (or was registered, lacking a
/// start) before `cutoff` and is no environment's current run.
pub fn lost_run_ids(
    open_runs: &[RunRecord],
    snapshot: &ControlSystemSnapshot,
    cutoff: DateTime<Utc>,
) -> Vec<i64> {
    let current = snapshot.current_run_numbers();
    open_runs
        .iter()
        .filter(|run| run.time_o2_end.is_none())
        .filter(|run| run.time_o2_start.unwrap_or(run.created_at) < cutoff)
        .filter(|run| !current.contains(&run.run_number))
        .map(|run| run.id)
        .collect()
}

/// Applies a control-system snapshot to the stored runs and environments.
#[derive(Clone)]
pub struct LostRunsAndEnvironments {
    persistence: Arc<dyn Persistence>,
    lost_threshold: TimeDelta,
}

impl LostRunsAndEnvironments {
    pub fn new(persistence: Arc<dyn Persistence>, lost_threshold: Duration) -> Self {
        Self {
            persistence,
            lost_threshold: TimeDelta::from_std(lost_threshold).unwrap_or(TimeDelta::MAX),
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.lost_threshold)
    }

    /// Mark lost environments. Returns how many were changed.
    pub async fn reconcile_environments(
        &self,
        snapshot: &ControlSystemSnapshot,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let Some(cutoff) = self.cutoff(now) else {
            return Ok(0);
        };
        let active = self.persistence.list_active_environments().await?;
        let lost = lost_environment_ids(&active, snapshot, cutoff);
        if lost.is_empty() {
            debug!(active = active.len(), "No lost environments");
            return Ok(0);
        }

        let changed = self
            .persistence
            .mark_environments_lost(&lost, LOST_ENVIRONMENT_MESSAGE, now)
            .await?;
        info!(environments = ?lost, changed, "Marked lost environments");
        Ok(changed)
    }

    /// Close lost runs. Returns how many were closed.
    pub async fn reconcile_runs(
        &self,
        snapshot: &ControlSystemSnapshot,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let Some(cutoff) = self.cutoff(now) else {
            return Ok(0);
        };
        let query = RunQuery {
            open_only: true,
            ..Default::default()
        };
        let open_runs = self.persistence.list_runs(&query).await?;
        let lost = lost_run_ids(&open_runs, snapshot, cutoff);
        if lost.is_empty() {
            debug!(open = open_runs.len(), "No lost runs");
            return Ok(0);
        }

        let closed = self.persistence.close_runs(&lost, now).await?;
        info!(closed, "Closed lost runs");
        Ok(closed)
    }
}
