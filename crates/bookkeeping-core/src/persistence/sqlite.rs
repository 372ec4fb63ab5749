//! SQLite-backed persistence implementation.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::commands::{
    EnvironmentUpdate, LhcFillUpdate, NewEnvironment, NewLhcFill, NewRun, Page, RunTimingPatch,
};
use crate::error::CoreError;
use crate::lifecycle::RunUpdatePlan;
use crate::model::{CalibrationStatus, EnvironmentStatus, ReasonType, RunDetectorQuality};

use super::{
    EnvironmentHistoryRecord, EnvironmentRecord, EorReasonRecord, LhcFillRecord, LogRecord,
    Persistence, RUN_COLUMNS, RunDetectorRecord, RunQuery, RunRecord,
};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a `sqlite:` URL, creating the database file when missing,
    /// and run all migrations.
    ///
    /// In-memory databases are limited to a single connection since every
    /// connection would otherwise see its own empty database.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Invalid SQLite URL {}: {}", database_url, e),
            })?
            .create_if_missing(true);

        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", database_url, e),
            })?;

        crate::migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// Create and initialize a SQLite persistence from a file path.
    ///
    /// Parent directories are created when missing.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        Self::connect(&format!("sqlite:{}", path.to_string_lossy()), 5).await
    }

    async fn insert_history(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        environment_id: &str,
        status: EnvironmentStatus,
        status_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO environment_history (environment_id, status, status_message, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(environment_id)
        .bind(status.as_str())
        .bind(status_message)
        .bind(at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn health_check(&self) -> Result<bool, CoreError> {
        let result: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(result == 1)
    }

    async fn insert_run(
        &self,
        run: &NewRun,
        calibration_status: Option<CalibrationStatus>,
    ) -> Result<i64, CoreError> {
        let now = Utc::now();
        let detectors = (!run.detectors.is_empty()).then(|| run.detectors.join(","));
        let mut tx = self.pool.begin().await?;

        let run_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO runs (
                run_number, environment_id, fill_number, time_o2_start, time_trg_start,
                detectors, trigger_value, dcs, dd_flp, epn, tfb_dd_mode,
                pdp_workflow_parameters, run_type, pdp_beam_type, readout_cfg_uri,
                calibration_status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(run.run_number)
        .bind(&run.environment_id)
        .bind(run.fill_number)
        .bind(run.time_o2_start)
        .bind(run.time_trg_start)
        .bind(&detectors)
        .bind(&run.trigger_value)
        .bind(run.dcs)
        .bind(run.dd_flp)
        .bind(run.epn)
        .bind(&run.tfb_dd_mode)
        .bind(&run.pdp_workflow_parameters)
        .bind(&run.run_type)
        .bind(&run.pdp_beam_type)
        .bind(&run.readout_cfg_uri)
        .bind(calibration_status.map(|status| status.as_str()))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for name in &run.detectors {
            sqlx::query("INSERT OR IGNORE INTO detectors (name) VALUES (?)")
                .bind(name)
                .execute(&mut *tx)
                .await?;

            let detector_id: i64 = sqlx::query_scalar("SELECT id FROM detectors WHERE name = ?")
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT OR IGNORE INTO run_detectors (run_id, detector_id, quality) VALUES (?, ?, ?)",
            )
            .bind(run_id)
            .bind(detector_id)
            .bind(RunDetectorQuality::default().as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(run_id)
    }

    async fn get_run(&self, run_number: i64) -> Result<Option<RunRecord>, CoreError> {
        let record = sqlx::query_as::<_, RunRecord>(&format!(
            "SELECT {} FROM runs WHERE run_number = ?",
            RUN_COLUMNS
        ))
        .bind(run_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_runs(&self, query: &RunQuery) -> Result<Vec<RunRecord>, CoreError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM runs WHERE 1 = 1", RUN_COLUMNS));

        if !query.run_numbers.is_empty() {
            builder.push(" AND run_number IN (");
            let mut separated = builder.separated(", ");
            for run_number in &query.run_numbers {
                separated.push_bind(*run_number);
            }
            separated.push_unseparated(")");
        }
        if !query.run_qualities.is_empty() {
            builder.push(" AND run_quality IN (");
            let mut separated = builder.separated(", ");
            for quality in &query.run_qualities {
                separated.push_bind(quality.clone());
            }
            separated.push_unseparated(")");
        }
        if !query.calibration_statuses.is_empty() {
            builder.push(" AND calibration_status IN (");
            let mut separated = builder.separated(", ");
            for status in &query.calibration_statuses {
                separated.push_bind(status.clone());
            }
            separated.push_unseparated(")");
        }
        if let Some(fill_number) = query.fill_number {
            builder.push(" AND fill_number = ").push_bind(fill_number);
        }
        if query.open_only {
            builder.push(" AND time_o2_end IS NULL");
        }
        builder.push(" ORDER BY run_number DESC");

        let records = builder
            .build_query_as::<RunRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn list_run_detectors(&self, run_id: i64) -> Result<Vec<RunDetectorRecord>, CoreError> {
        let records = sqlx::query_as::<_, RunDetectorRecord>(
            r#"
            SELECT d.id AS detector_id, d.name, rd.quality
            FROM run_detectors rd
            JOIN detectors d ON d.id = rd.detector_id
            WHERE rd.run_id = ?
            ORDER BY d.name
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_eor_reasons(&self, run_id: i64) -> Result<Vec<EorReasonRecord>, CoreError> {
        let records = sqlx::query_as::<_, EorReasonRecord>(
            r#"
            SELECT e.id, e.reason_type_id, t.category, t.title, e.description,
                   e.last_edited_name, e.created_at
            FROM eor_reasons e
            JOIN reason_types t ON t.id = e.reason_type_id
            WHERE e.run_id = ?
            ORDER BY e.id
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_reason_types(&self) -> Result<Vec<ReasonType>, CoreError> {
        let records = sqlx::query_as::<_, ReasonType>(
            "SELECT id, category, title FROM reason_types ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn apply_run_update(&self, plan: &RunUpdatePlan) -> Result<(), CoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        if let Some(change) = &plan.run_quality {
            sqlx::query("UPDATE runs SET run_quality = ?, updated_at = ? WHERE id = ?")
                .bind(change.next.as_str())
                .bind(now)
                .bind(plan.run_id)
                .execute(&mut *tx)
                .await?;
        }

        for change in &plan.detector_qualities {
            sqlx::query("UPDATE run_detectors SET quality = ? WHERE run_id = ? AND detector_id = ?")
                .bind(change.next.as_str())
                .bind(plan.run_id)
                .bind(change.detector_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(change) = &plan.calibration_status {
            sqlx::query("UPDATE runs SET calibration_status = ?, updated_at = ? WHERE id = ?")
                .bind(change.next.as_str())
                .bind(now)
                .bind(plan.run_id)
                .execute(&mut *tx)
                .await?;
        }

        for reason in &plan.eor_reasons {
            sqlx::query(
                r#"
                INSERT INTO eor_reasons (run_id, reason_type_id, description, last_edited_name, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(plan.run_id)
            .bind(reason.reason_type.id)
            .bind(&reason.description)
            .bind(&plan.actor)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for entry in &plan.audit_entries {
            sqlx::query(
                r#"
                INSERT INTO logs (title, text, origin, subtype, author, run_number, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.title)
            .bind(&entry.text)
            .bind(&entry.origin)
            .bind(&entry.subtype)
            .bind(&entry.author)
            .bind(entry.run_number)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn patch_run_timing(&self, run_id: i64, patch: &RunTimingPatch) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE runs
            SET time_o2_start = COALESCE(?, time_o2_start),
                time_o2_end = COALESCE(?, time_o2_end),
                time_trg_start = COALESCE(?, time_trg_start),
                time_trg_end = COALESCE(?, time_trg_end),
                fill_number = COALESCE(?, fill_number),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(patch.time_o2_start)
        .bind(patch.time_o2_end)
        .bind(patch.time_trg_start)
        .bind(patch.time_trg_end)
        .bind(patch.fill_number)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn close_runs(&self, run_ids: &[i64], closed_at: DateTime<Utc>) -> Result<u64, CoreError> {
        let mut tx = self.pool.begin().await?;
        let mut closed = 0;

        for run_id in run_ids {
            let result = sqlx::query(
                r#"
                UPDATE runs
                SET time_o2_end = ?,
                    time_trg_end = CASE
                        WHEN time_trg_start IS NOT NULL AND time_trg_end IS NULL THEN ?
                        ELSE time_trg_end
                    END,
                    updated_at = ?
                WHERE id = ? AND time_o2_end IS NULL
                "#,
            )
            .bind(closed_at)
            .bind(closed_at)
            .bind(closed_at)
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
            closed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(closed)
    }

    async fn list_run_logs(&self, run_number: i64) -> Result<Vec<LogRecord>, CoreError> {
        let records = sqlx::query_as::<_, LogRecord>(
            r#"
            SELECT id, title, text, origin, subtype, author, run_number, created_at
            FROM logs
            WHERE run_number = ?
            ORDER BY id
            "#,
        )
        .bind(run_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn insert_environment(&self, environment: &NewEnvironment) -> Result<(), CoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO environments (id, status, status_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&environment.id)
        .bind(environment.status.as_str())
        .bind(&environment.status_message)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::insert_history(
            &mut tx,
            &environment.id,
            environment.status,
            environment.status_message.as_deref(),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_environment(&self, id: &str) -> Result<Option<EnvironmentRecord>, CoreError> {
        let record = sqlx::query_as::<_, EnvironmentRecord>(
            r#"
            SELECT id, status, status_message, toredown_at, created_at, updated_at
            FROM environments
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_environments(&self, page: &Page) -> Result<Vec<EnvironmentRecord>, CoreError> {
        let records = sqlx::query_as::<_, EnvironmentRecord>(
            r#"
            SELECT id, status, status_message, toredown_at, created_at, updated_at
            FROM environments
            ORDER BY created_at DESC, id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_environments(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM environments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_environment(
        &self,
        id: &str,
        update: &EnvironmentUpdate,
    ) -> Result<(), CoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM environments WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current) = current else {
            return Err(CoreError::EnvironmentNotFound {
                environment_id: id.to_string(),
            });
        };

        sqlx::query(
            r#"
            UPDATE environments
            SET status = COALESCE(?, status),
                status_message = COALESCE(?, status_message),
                toredown_at = COALESCE(?, toredown_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.map(|status| status.as_str()))
        .bind(&update.status_message)
        .bind(update.toredown_at)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(status) = update.status
            && status.as_str() != current
        {
            Self::insert_history(&mut tx, id, status, update.status_message.as_deref(), now)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_environment_history(
        &self,
        id: &str,
    ) -> Result<Vec<EnvironmentHistoryRecord>, CoreError> {
        let records = sqlx::query_as::<_, EnvironmentHistoryRecord>(
            r#"
            SELECT status, status_message, created_at
            FROM environment_history
            WHERE environment_id = ?
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_environment_run_numbers(&self, id: &str) -> Result<Vec<i64>, CoreError> {
        let numbers: Vec<i64> = sqlx::query_scalar(
            "SELECT run_number FROM runs WHERE environment_id = ? ORDER BY run_number DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers)
    }

    async fn list_active_environments(&self) -> Result<Vec<EnvironmentRecord>, CoreError> {
        let records = sqlx::query_as::<_, EnvironmentRecord>(
            r#"
            SELECT id, status, status_message, toredown_at, created_at, updated_at
            FROM environments
            WHERE toredown_at IS NULL
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn mark_environments_lost(
        &self,
        ids: &[String],
        status_message: &str,
        lost_at: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE environments
                SET status = ?, status_message = ?, toredown_at = ?, updated_at = ?
                WHERE id = ?
                  AND toredown_at IS NULL
                  AND status NOT IN ('ERROR', 'DESTROYED', 'DONE')
                "#,
            )
            .bind(EnvironmentStatus::Error.as_str())
            .bind(status_message)
            .bind(lost_at)
            .bind(lost_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                Self::insert_history(
                    &mut tx,
                    id,
                    EnvironmentStatus::Error,
                    Some(status_message),
                    lost_at,
                )
                .await?;
                changed += result.rows_affected();
            }
        }

        tx.commit().await?;
        Ok(changed)
    }

    async fn insert_lhc_fill(&self, fill: &NewLhcFill) -> Result<(), CoreError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO lhc_fills (
                fill_number, stable_beams_start, stable_beams_end, beam_type,
                filling_scheme_name, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(fill.fill_number)
        .bind(fill.stable_beams_start)
        .bind(fill.stable_beams_end)
        .bind(&fill.beam_type)
        .bind(&fill.filling_scheme_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_lhc_fill(&self, fill_number: i64) -> Result<Option<LhcFillRecord>, CoreError> {
        let record = sqlx::query_as::<_, LhcFillRecord>(
            r#"
            SELECT fill_number, stable_beams_start, stable_beams_end, beam_type,
                   filling_scheme_name, created_at, updated_at
            FROM lhc_fills
            WHERE fill_number = ?
            "#,
        )
        .bind(fill_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_lhc_fills(&self, page: &Page) -> Result<Vec<LhcFillRecord>, CoreError> {
        let records = sqlx::query_as::<_, LhcFillRecord>(
            r#"
            SELECT fill_number, stable_beams_start, stable_beams_end, beam_type,
                   filling_scheme_name, created_at, updated_at
            FROM lhc_fills
            ORDER BY fill_number DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_lhc_fills(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lhc_fills")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_lhc_fill(
        &self,
        fill_number: i64,
        update: &LhcFillUpdate,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE lhc_fills
            SET stable_beams_start = COALESCE(?, stable_beams_start),
                stable_beams_end = COALESCE(?, stable_beams_end),
                beam_type = COALESCE(?, beam_type),
                filling_scheme_name = COALESCE(?, filling_scheme_name),
                updated_at = ?
            WHERE fill_number = ?
            "#,
        )
        .bind(update.stable_beams_start)
        .bind(update.stable_beams_end)
        .bind(&update.beam_type)
        .bind(&update.filling_scheme_name)
        .bind(Utc::now())
        .bind(fill_number)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{FieldChange, NewLogEntry};
    use crate::model::RunQuality;
    use chrono::Duration;

    /// Create an in-memory SQLite pool for testing.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        crate::migrations::SQLITE
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn new_run(run_number: i64, detectors: &[&str]) -> NewRun {
        NewRun {
            run_number,
            time_o2_start: Some(Utc::now()),
            detectors: detectors.iter().map(|d| d.to_string()).collect(),
            run_type: Some("PHYSICS".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_run() {
        let persistence = SqlitePersistence::new(test_pool().await);

        let run_id = persistence
            .insert_run(&new_run(106, &["ITS", "FT0"]), None)
            .await
            .expect("Failed to insert run");

        let run = persistence
            .get_run(106)
            .await
            .expect("Failed to get run")
            .expect("Run should exist");
        assert_eq!(run.id, run_id);
        assert_eq!(run.detectors.as_deref(), Some("ITS,FT0"));
        assert_eq!(run.run_quality, "good");
        assert_eq!(run.calibration_status, None);

        let detectors = persistence.list_run_detectors(run_id).await.unwrap();
        let names: Vec<_> = detectors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["FT0", "ITS"]);
        assert!(detectors.iter().all(|d| d.quality == "good"));
    }

    #[tokio::test]
    async fn test_detectors_are_shared_between_runs() {
        let persistence = SqlitePersistence::new(test_pool().await);

        let first = persistence.insert_run(&new_run(1, &["TPC"]), None).await.unwrap();
        let second = persistence.insert_run(&new_run(2, &["TPC"]), None).await.unwrap();

        let first = persistence.list_run_detectors(first).await.unwrap();
        let second = persistence.list_run_detectors(second).await.unwrap();
        assert_eq!(first[0].detector_id, second[0].detector_id);
    }

    #[tokio::test]
    async fn test_duplicate_run_number_fails() {
        let persistence = SqlitePersistence::new(test_pool().await);
        persistence.insert_run(&new_run(1, &[]), None).await.unwrap();

        let result = persistence.insert_run(&new_run(1, &[]), None).await;
        assert!(matches!(result, Err(CoreError::DatabaseError { .. })));
    }

    #[tokio::test]
    async fn test_get_run_not_found() {
        let persistence = SqlitePersistence::new(test_pool().await);
        assert!(persistence.get_run(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_runs_filters() {
        let persistence = SqlitePersistence::new(test_pool().await);
        for run_number in 1..=3 {
            persistence.insert_run(&new_run(run_number, &[]), None).await.unwrap();
        }
        let mut calibration = new_run(4, &[]);
        calibration.run_type = Some("PEDESTAL".to_string());
        persistence
            .insert_run(&calibration, Some(CalibrationStatus::NoStatus))
            .await
            .unwrap();

        let all = persistence.list_runs(&RunQuery::default()).await.unwrap();
        let numbers: Vec<_> = all.iter().map(|r| r.run_number).collect();
        assert_eq!(numbers, vec![4, 3, 2, 1]);

        let selected = persistence
            .list_runs(&RunQuery {
                run_numbers: vec![1, 3],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(selected.len(), 2);

        let calibrations = persistence
            .list_runs(&RunQuery {
                calibration_statuses: vec!["NO_STATUS".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(calibrations.len(), 1);
        assert_eq!(calibrations[0].run_number, 4);
    }

    #[tokio::test]
    async fn test_apply_run_update_writes_audit_entries() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let run_id = persistence.insert_run(&new_run(7, &["TPC"]), None).await.unwrap();
        let reason_type = persistence.list_reason_types().await.unwrap()[0].clone();

        let plan = RunUpdatePlan {
            run_id,
            run_number: 7,
            run_quality: Some(FieldChange {
                previous: RunQuality::Good,
                next: RunQuality::Bad,
                reason: Some("beam loss".to_string()),
            }),
            detector_qualities: Vec::new(),
            detectors_qualities_change_reason: None,
            calibration_status: None,
            eor_reasons: vec![crate::lifecycle::PlannedEorReason {
                reason_type,
                description: Some("Some description".to_string()),
            }],
            actor: Some("shifter".to_string()),
            audit_entries: vec![NewLogEntry {
                title: "Run 7 quality has changed to bad".to_string(),
                text: "changed".to_string(),
                origin: "process".to_string(),
                subtype: "run".to_string(),
                author: Some("shifter".to_string()),
                run_number: 7,
            }],
        };
        persistence.apply_run_update(&plan).await.unwrap();

        let run = persistence.get_run(7).await.unwrap().unwrap();
        assert_eq!(run.run_quality, "bad");

        let reasons = persistence.list_eor_reasons(run_id).await.unwrap();
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0].category, "DETECTORS");
        assert_eq!(reasons[0].last_edited_name.as_deref(), Some("shifter"));

        let logs = persistence.list_run_logs(7).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].author.as_deref(), Some("shifter"));
    }

    #[tokio::test]
    async fn test_close_runs_is_idempotent() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let mut triggered = new_run(1, &[]);
        triggered.time_trg_start = Some(Utc::now() - Duration::hours(1));
        let triggered = persistence.insert_run(&triggered, None).await.unwrap();
        let untriggered = persistence.insert_run(&new_run(2, &[]), None).await.unwrap();

        let closed_at = Utc::now();
        let closed = persistence
            .close_runs(&[triggered, untriggered], closed_at)
            .await
            .unwrap();
        assert_eq!(closed, 2);

        let run = persistence.get_run(1).await.unwrap().unwrap();
        assert!(run.time_o2_end.is_some());
        assert!(run.time_trg_end.is_some());
        let run = persistence.get_run(2).await.unwrap().unwrap();
        assert!(run.time_o2_end.is_some());
        assert!(run.time_trg_end.is_none());

        let closed = persistence
            .close_runs(&[triggered, untriggered], Utc::now())
            .await
            .unwrap();
        assert_eq!(closed, 0);

        let open = persistence
            .list_runs(&RunQuery {
                open_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn test_environment_history() {
        let persistence = SqlitePersistence::new(test_pool().await);
        persistence
            .insert_environment(&NewEnvironment {
                id: "ENV1".to_string(),
                status: EnvironmentStatus::Standby,
                status_message: None,
            })
            .await
            .unwrap();

        persistence
            .update_environment(
                "ENV1",
                &EnvironmentUpdate {
                    status: Some(EnvironmentStatus::Running),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // Same status again: no new history item.
        persistence
            .update_environment(
                "ENV1",
                &EnvironmentUpdate {
                    status: Some(EnvironmentStatus::Running),
                    status_message: Some("still running".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let environment = persistence.get_environment("ENV1").await.unwrap().unwrap();
        assert_eq!(environment.status, "RUNNING");
        assert_eq!(environment.status_message.as_deref(), Some("still running"));

        let history = persistence.list_environment_history("ENV1").await.unwrap();
        let statuses: Vec<_> = history.iter().map(|h| h.status.as_str()).collect();
        assert_eq!(statuses, vec!["STANDBY", "RUNNING"]);
    }

    #[tokio::test]
    async fn test_update_unknown_environment() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let result = persistence
            .update_environment("missing", &EnvironmentUpdate::default())
            .await;
        assert!(matches!(result, Err(CoreError::EnvironmentNotFound { .. })));
    }

    #[tokio::test]
    async fn test_mark_environments_lost() {
        let persistence = SqlitePersistence::new(test_pool().await);
        for (id, status) in [
            ("ENV1", EnvironmentStatus::Running),
            ("ENV2", EnvironmentStatus::Destroyed),
        ] {
            persistence
                .insert_environment(&NewEnvironment {
                    id: id.to_string(),
                    status,
                    status_message: None,
                })
                .await
                .unwrap();
        }

        let ids = vec!["ENV1".to_string(), "ENV2".to_string()];
        let changed = persistence
            .mark_environments_lost(&ids, "lost", Utc::now())
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let environment = persistence.get_environment("ENV1").await.unwrap().unwrap();
        assert_eq!(environment.status, "ERROR");
        assert!(environment.toredown_at.is_some());
        let history = persistence.list_environment_history("ENV1").await.unwrap();
        assert_eq!(history.last().unwrap().status_message.as_deref(), Some("lost"));

        let changed = persistence
            .mark_environments_lost(&ids, "lost", Utc::now())
            .await
            .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(persistence.list_active_environments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lhc_fill_crud() {
        let persistence = SqlitePersistence::new(test_pool().await);
        persistence
            .insert_lhc_fill(&NewLhcFill {
                fill_number: 8000,
                beam_type: Some("p-p".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let start = Utc::now();
        persistence
            .update_lhc_fill(
                8000,
                &LhcFillUpdate {
                    stable_beams_start: Some(start),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fill = persistence.get_lhc_fill(8000).await.unwrap().unwrap();
        assert!(fill.stable_beams_start.is_some());
        assert_eq!(fill.beam_type.as_deref(), Some("p-p"));
        assert_eq!(persistence.count_lhc_fills().await.unwrap(), 1);
        assert_eq!(
            persistence.list_lhc_fills(&Page::default()).await.unwrap().len(),
            1
        );
    }
}
