//! Persistence interfaces and backends for bookkeeping-core.
//!
//! This module defines the persistence abstraction and backend implementations.
//! Records mirror table rows; enumerated columns stay plain strings here and
//! are parsed by the services.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::commands::{
    EnvironmentUpdate, LhcFillUpdate, NewEnvironment, NewLhcFill, NewRun, Page, RunTimingPatch,
};
use crate::error::CoreError;
use crate::lifecycle::RunUpdatePlan;
use crate::model::{CalibrationStatus, ReasonType};

/// Run record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRecord {
    /// Database primary key.
    pub id: i64,
    pub run_number: i64,
    pub environment_id: Option<String>,
    pub fill_number: Option<i64>,
    pub time_o2_start: Option<DateTime<Utc>>,
    pub time_o2_end: Option<DateTime<Utc>>,
    pub time_trg_start: Option<DateTime<Utc>>,
    pub time_trg_end: Option<DateTime<Utc>>,
    /// Comma-joined detector names.
    pub detectors: Option<String>,
    pub trigger_value: Option<String>,
    pub dcs: Option<bool>,
    pub dd_flp: Option<bool>,
    pub epn: Option<bool>,
    pub tfb_dd_mode: Option<String>,
    pub pdp_workflow_parameters: Option<String>,
    pub run_type: Option<String>,
    pub pdp_beam_type: Option<String>,
    pub readout_cfg_uri: Option<String>,
    /// good, bad, test or none.
    pub run_quality: String,
    /// NO_STATUS, SUCCESS or FAILED; absent for non calibration runs.
    pub calibration_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns selected into [`RunRecord`].
pub(crate) const RUN_COLUMNS: &str = "id, run_number, environment_id, fill_number, \
     time_o2_start, time_o2_end, time_trg_start, time_trg_end, detectors, trigger_value, \
     dcs, dd_flp, epn, tfb_dd_mode, pdp_workflow_parameters, run_type, pdp_beam_type, \
     readout_cfg_uri, run_quality, calibration_status, created_at, updated_at";

/// Detector of a run with its quality.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunDetectorRecord {
    pub detector_id: i64,
    pub name: String,
    pub quality: String,
}

/// End-of-run reason joined with its reason type.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EorReasonRecord {
    pub id: i64,
    pub reason_type_id: i64,
    pub category: String,
    pub title: String,
    pub description: Option<String>,
    pub last_edited_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Environment record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnvironmentRecord {
    pub id: String,
    pub status: String,
    pub status_message: Option<String>,
    pub toredown_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of an environment's status history.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnvironmentHistoryRecord {
    pub status: String,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// LHC fill record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LhcFillRecord {
    pub fill_number: i64,
    pub stable_beams_start: Option<DateTime<Utc>>,
    pub stable_beams_end: Option<DateTime<Utc>>,
    pub beam_type: Option<String>,
    pub filling_scheme_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit log record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LogRecord {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub origin: String,
    pub subtype: String,
    pub author: Option<String>,
    pub run_number: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Storage-level run selection. Empty lists do not filter.
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    pub run_numbers: Vec<i64>,
    pub run_qualities: Vec<String>,
    pub calibration_statuses: Vec<String>,
    pub fill_number: Option<i64>,
    /// Only runs without `time_o2_end`.
    pub open_only: bool,
}

/// Persistence interface used by the services and the housekeeping jobs.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Check database connectivity.
    async fn health_check(&self) -> Result<bool, CoreError>;

    // Runs

    /// Insert a run with its detectors (created when unknown) and return its id.
    async fn insert_run(
        &self,
        run: &NewRun,
        calibration_status: Option<CalibrationStatus>,
    ) -> Result<i64, CoreError>;

    async fn get_run(&self, run_number: i64) -> Result<Option<RunRecord>, CoreError>;

    /// Runs matching the query, by run number descending.
    async fn list_runs(&self, query: &RunQuery) -> Result<Vec<RunRecord>, CoreError>;

    async fn list_run_detectors(&self, run_id: i64) -> Result<Vec<RunDetectorRecord>, CoreError>;

    async fn list_eor_reasons(&self, run_id: i64) -> Result<Vec<EorReasonRecord>, CoreError>;

    async fn list_reason_types(&self) -> Result<Vec<ReasonType>, CoreError>;

    /// Write every change of an accepted run update in one transaction.
    async fn apply_run_update(&self, plan: &RunUpdatePlan) -> Result<(), CoreError>;

    async fn patch_run_timing(&self, run_id: i64, patch: &RunTimingPatch) -> Result<(), CoreError>;

    /// Set the O2 end (and a missing trigger end of a triggered run) of the
    /// given runs that are still open. Returns the number of runs closed.
    async fn close_runs(&self, run_ids: &[i64], closed_at: DateTime<Utc>) -> Result<u64, CoreError>;

    async fn list_run_logs(&self, run_number: i64) -> Result<Vec<LogRecord>, CoreError>;

    // Environments

    /// Insert an environment and its first history item.
    async fn insert_environment(&self, environment: &NewEnvironment) -> Result<(), CoreError>;

    async fn get_environment(&self, id: &str) -> Result<Option<EnvironmentRecord>, CoreError>;

    /// Environments, most recently created first.
    async fn list_environments(&self, page: &Page) -> Result<Vec<EnvironmentRecord>, CoreError>;

    async fn count_environments(&self) -> Result<i64, CoreError>;

    /// Update an environment, appending a history item when the status changes.
    async fn update_environment(
        &self,
        id: &str,
        update: &EnvironmentUpdate,
    ) -> Result<(), CoreError>;

    async fn list_environment_history(
        &self,
        id: &str,
    ) -> Result<Vec<EnvironmentHistoryRecord>, CoreError>;

    async fn list_environment_run_numbers(&self, id: &str) -> Result<Vec<i64>, CoreError>;

    /// Environments that were never torn down.
    async fn list_active_environments(&self) -> Result<Vec<EnvironmentRecord>, CoreError>;

    /// Move still active environments to `ERROR` with the given message.
    /// Returns the number of environments changed.
    async fn mark_environments_lost(
        &self,
        ids: &[String],
        status_message: &str,
        lost_at: DateTime<Utc>,
    ) -> Result<u64, CoreError>;

    // LHC fills

    async fn insert_lhc_fill(&self, fill: &NewLhcFill) -> Result<(), CoreError>;

    async fn get_lhc_fill(&self, fill_number: i64) -> Result<Option<LhcFillRecord>, CoreError>;

    /// Fills, highest fill number first.
    async fn list_lhc_fills(&self, page: &Page) -> Result<Vec<LhcFillRecord>, CoreError>;

    async fn count_lhc_fills(&self) -> Result<i64, CoreError>;

    async fn update_lhc_fill(
        &self,
        fill_number: i64,
        update: &LhcFillUpdate,
    ) -> Result<(), CoreError>;
}

/// Open the store behind `database_url` and bring its schema up to date.
///
/// `sqlite:` URLs select the SQLite backend, anything else PostgreSQL.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
) -> Result<Arc<dyn Persistence>, CoreError> {
    if database_url.starts_with("sqlite:") {
        let persistence = SqlitePersistence::connect(database_url, max_connections).await?;
        Ok(Arc::new(persistence))
    } else {
        let persistence = PostgresPersistence::connect(database_url, max_connections).await?;
        Ok(Arc::new(persistence))
    }
}
