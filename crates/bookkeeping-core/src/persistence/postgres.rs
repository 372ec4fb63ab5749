// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence.
//!
//! Provides all durable storage access functions for runs, environments,
//! LHC fills and the audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

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

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and run the migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to PostgreSQL: {}", e),
            })?;

        crate::migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Run Operations
// ============================================================================

/// Insert a run, get-or-create its detectors and link them.
pub async fn insert_run(
    pool: &PgPool,
    run: &NewRun,
    calibration_status: Option<CalibrationStatus>,
) -> Result<i64, CoreError> {
    let now = Utc::now();
    let detectors = (!run.detectors.is_empty()).then(|| run.detectors.join(","));
    let mut tx = pool.begin().await?;

    let run_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO runs (
            run_number, environment_id, fill_number, time_o2_start, time_trg_start,
            detectors, trigger_value, dcs, dd_flp, epn, tfb_dd_mode,
            pdp_workflow_parameters, run_type, pdp_beam_type, readout_cfg_uri,
            calibration_status, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
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
    .fetch_one(&mut *tx)
    .await?;

    for name in &run.detectors {
        sqlx::query("INSERT INTO detectors (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let detector_id: i64 = sqlx::query_scalar("SELECT id FROM detectors WHERE name = $1")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO run_detectors (run_id, detector_id, quality)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id, detector_id) DO NOTHING
            "#,
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

/// Get a run by number.
pub async fn get_run(pool: &PgPool, run_number: i64) -> Result<Option<RunRecord>, CoreError> {
    let record = sqlx::query_as::<_, RunRecord>(&format!(
        "SELECT {} FROM runs WHERE run_number = $1",
        RUN_COLUMNS
    ))
    .bind(run_number)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// List runs matching a query.
pub async fn list_runs(pool: &PgPool, query: &RunQuery) -> Result<Vec<RunRecord>, CoreError> {
    let mut builder: QueryBuilder<Postgres> =
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
        .fetch_all(pool)
        .await?;

    Ok(records)
}

/// Detectors of a run, by name.
pub async fn list_run_detectors(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<RunDetectorRecord>, CoreError> {
    let records = sqlx::query_as::<_, RunDetectorRecord>(
        r#"
        SELECT d.id AS detector_id, d.name, rd.quality
        FROM run_detectors rd
        JOIN detectors d ON d.id = rd.detector_id
        WHERE rd.run_id = $1
        ORDER BY d.name
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// EOR reasons of a run, oldest first.
pub async fn list_eor_reasons(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<EorReasonRecord>, CoreError> {
    let records = sqlx::query_as::<_, EorReasonRecord>(
        r#"
        SELECT e.id, e.reason_type_id, t.category, t.title, e.description,
               e.last_edited_name, e.created_at
        FROM eor_reasons e
        JOIN reason_types t ON t.id = e.reason_type_id
        WHERE e.run_id = $1
        ORDER BY e.id
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// All EOR reason types.
pub async fn list_reason_types(pool: &PgPool) -> Result<Vec<ReasonType>, CoreError> {
    let records = sqlx::query_as::<_, ReasonType>(
        "SELECT id, category, title FROM reason_types ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Persist an accepted run update with its audit entries.
pub async fn apply_run_update(pool: &PgPool, plan: &RunUpdatePlan) -> Result<(), CoreError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    if let Some(change) = &plan.run_quality {
        sqlx::query("UPDATE runs SET run_quality = $1, updated_at = $2 WHERE id = $3")
            .bind(change.next.as_str())
            .bind(now)
            .bind(plan.run_id)
            .execute(&mut *tx)
            .await?;
    }

    for change in &plan.detector_qualities {
        sqlx::query("UPDATE run_detectors SET quality = $1 WHERE run_id = $2 AND detector_id = $3")
            .bind(change.next.as_str())
            .bind(plan.run_id)
            .bind(change.detector_id)
            .execute(&mut *tx)
            .await?;
    }

    if let Some(change) = &plan.calibration_status {
        sqlx::query("UPDATE runs SET calibration_status = $1, updated_at = $2 WHERE id = $3")
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
            VALUES ($1, $2, $3, $4, $5)
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
            VALUES ($1, $2, $3, $4, $5, $6, $7)
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

/// Set the given timestamps and fill of a run.
pub async fn patch_run_timing(
    pool: &PgPool,
    run_id: i64,
    patch: &RunTimingPatch,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE runs
        SET time_o2_start = COALESCE($1, time_o2_start),
            time_o2_end = COALESCE($2, time_o2_end),
            time_trg_start = COALESCE($3, time_trg_start),
            time_trg_end = COALESCE($4, time_trg_end),
            fill_number = COALESCE($5, fill_number),
            updated_at = $6
        WHERE id = $7
        "#,
    )
    .bind(patch.time_o2_start)
    .bind(patch.time_o2_end)
    .bind(patch.time_trg_start)
    .bind(patch.time_trg_end)
    .bind(patch.fill_number)
    .bind(Utc::now())
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Close the given runs that are still open.
pub async fn close_runs(
    pool: &PgPool,
    run_ids: &[i64],
    closed_at: DateTime<Utc>,
) -> Result<u64, CoreError> {
    let mut tx = pool.begin().await?;
    let mut closed = 0;

    for run_id in run_ids {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET time_o2_end = $1,
                time_trg_end = CASE
                    WHEN time_trg_start IS NOT NULL AND time_trg_end IS NULL THEN $1
                    ELSE time_trg_end
                END,
                updated_at = $1
            WHERE id = $2 AND time_o2_end IS NULL
            "#,
        )
        .bind(closed_at)
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
        closed += result.rows_affected();
    }

    tx.commit().await?;
    Ok(closed)
}

/// Audit entries of a run, oldest first.
pub async fn list_run_logs(pool: &PgPool, run_number: i64) -> Result<Vec<LogRecord>, CoreError> {
    let records = sqlx::query_as::<_, LogRecord>(
        r#"
        SELECT id, title, text, origin, subtype, author, run_number, created_at
        FROM logs
        WHERE run_number = $1
        ORDER BY id
        "#,
    )
    .bind(run_number)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

// ============================================================================
// Environment Operations
// ============================================================================

/// Insert an environment and its first history item.
pub async fn insert_environment(
    pool: &PgPool,
    environment: &NewEnvironment,
) -> Result<(), CoreError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO environments (id, status, status_message, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        "#,
    )
    .bind(&environment.id)
    .bind(environment.status.as_str())
    .bind(&environment.status_message)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    insert_history(
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

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    environment_id: &str,
    status: EnvironmentStatus,
    status_message: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO environment_history (environment_id, status, status_message, created_at)
        VALUES ($1, $2, $3, $4)
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

/// Get an environment by id.
pub async fn get_environment(
    pool: &PgPool,
    id: &str,
) -> Result<Option<EnvironmentRecord>, CoreError> {
    let record = sqlx::query_as::<_, EnvironmentRecord>(
        r#"
        SELECT id, status, status_message, toredown_at, created_at, updated_at
        FROM environments
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// List environments, most recent first.
pub async fn list_environments(
    pool: &PgPool,
    page: &Page,
) -> Result<Vec<EnvironmentRecord>, CoreError> {
    let records = sqlx::query_as::<_, EnvironmentRecord>(
        r#"
        SELECT id, status, status_message, toredown_at, created_at, updated_at
        FROM environments
        ORDER BY created_at DESC, id
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Count all environments.
pub async fn count_environments(pool: &PgPool) -> Result<i64, CoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM environments")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Update an environment; a status change appends a history item.
pub async fn update_environment(
    pool: &PgPool,
    id: &str,
    update: &EnvironmentUpdate,
) -> Result<(), CoreError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM environments WHERE id = $1 FOR UPDATE")
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
        SET status = COALESCE($1, status),
            status_message = COALESCE($2, status_message),
            toredown_at = COALESCE($3, toredown_at),
            updated_at = $4
        WHERE id = $5
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
        insert_history(&mut tx, id, status, update.status_message.as_deref(), now).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Status history of an environment, oldest first.
pub async fn list_environment_history(
    pool: &PgPool,
    id: &str,
) -> Result<Vec<EnvironmentHistoryRecord>, CoreError> {
    let records = sqlx::query_as::<_, EnvironmentHistoryRecord>(
        r#"
        SELECT status, status_message, created_at
        FROM environment_history
        WHERE environment_id = $1
        ORDER BY id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Run numbers hosted by an environment.
pub async fn list_environment_run_numbers(pool: &PgPool, id: &str) -> Result<Vec<i64>, CoreError> {
    let numbers: Vec<i64> = sqlx::query_scalar(
        "SELECT run_number FROM runs WHERE environment_id = $1 ORDER BY run_number DESC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(numbers)
}

/// Environments without a teardown date.
pub async fn list_active_environments(pool: &PgPool) -> Result<Vec<EnvironmentRecord>, CoreError> {
    let records = sqlx::query_as::<_, EnvironmentRecord>(
        r#"
        SELECT id, status, status_message, toredown_at, created_at, updated_at
        FROM environments
        WHERE toredown_at IS NULL
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Move still active environments to ERROR.
pub async fn mark_environments_lost(
    pool: &PgPool,
    ids: &[String],
    status_message: &str,
    lost_at: DateTime<Utc>,
) -> Result<u64, CoreError> {
    let mut tx = pool.begin().await?;
    let mut changed = 0;

    for id in ids {
        let result = sqlx::query(
            r#"
            UPDATE environments
            SET status = $1, status_message = $2, toredown_at = $3, updated_at = $3
            WHERE id = $4
              AND toredown_at IS NULL
              AND status NOT IN ('ERROR', 'DESTROYED', 'DONE')
            "#,
        )
        .bind(EnvironmentStatus::Error.as_str())
        .bind(status_message)
        .bind(lost_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            insert_history(&mut tx, id, EnvironmentStatus::Error, Some(status_message), lost_at)
                .await?;
            changed += result.rows_affected();
        }
    }

    tx.commit().await?;
    Ok(changed)
}

// ============================================================================
// LHC Fill Operations
// ============================================================================

/// Insert an LHC fill.
pub async fn insert_lhc_fill(pool: &PgPool, fill: &NewLhcFill) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO lhc_fills (
            fill_number, stable_beams_start, stable_beams_end, beam_type,
            filling_scheme_name, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(fill.fill_number)
    .bind(fill.stable_beams_start)
    .bind(fill.stable_beams_end)
    .bind(&fill.beam_type)
    .bind(&fill.filling_scheme_name)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Get an LHC fill by number.
pub async fn get_lhc_fill(pool: &PgPool, fill_number: i64) -> Result<Option<LhcFillRecord>, CoreError> {
    let record = sqlx::query_as::<_, LhcFillRecord>(
        r#"
        SELECT fill_number, stable_beams_start, stable_beams_end, beam_type,
               filling_scheme_name, created_at, updated_at
        FROM lhc_fills
        WHERE fill_number = $1
        "#,
    )
    .bind(fill_number)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// List LHC fills, highest number first.
pub async fn list_lhc_fills(pool: &PgPool, page: &Page) -> Result<Vec<LhcFillRecord>, CoreError> {
    let records = sqlx::query_as::<_, LhcFillRecord>(
        r#"
        SELECT fill_number, stable_beams_start, stable_beams_end, beam_type,
               filling_scheme_name, created_at, updated_at
        FROM lhc_fills
        ORDER BY fill_number DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Count all LHC fills.
pub async fn count_lhc_fills(pool: &PgPool) -> Result<i64, CoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lhc_fills")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Update the given fields of an LHC fill.
pub async fn update_lhc_fill(
    pool: &PgPool,
    fill_number: i64,
    update: &LhcFillUpdate,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE lhc_fills
        SET stable_beams_start = COALESCE($1, stable_beams_start),
            stable_beams_end = COALESCE($2, stable_beams_end),
            beam_type = COALESCE($3, beam_type),
            filling_scheme_name = COALESCE($4, filling_scheme_name),
            updated_at = $5
        WHERE fill_number = $6
        "#,
    )
    .bind(update.stable_beams_start)
    .bind(update.stable_beams_end)
    .bind(&update.beam_type)
    .bind(&update.filling_scheme_name)
    .bind(Utc::now())
    .bind(fill_number)
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl Persistence for PostgresPersistence {
    async fn health_check(&self) -> Result<bool, CoreError> {
        let result: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(result == 1)
    }

    async fn insert_run(
        &self,
        run: &NewRun,
        calibration_status: Option<CalibrationStatus>,
    ) -> Result<i64, CoreError> {
        insert_run(&self.pool, run, calibration_status).await
    }

    async fn get_run(&self, run_number: i64) -> Result<Option<RunRecord>, CoreError> {
        get_run(&self.pool, run_number).await
    }

    async fn list_runs(&self, query: &RunQuery) -> Result<Vec<RunRecord>, CoreError> {
        list_runs(&self.pool, query).await
    }

    async fn list_run_detectors(&self, run_id: i64) -> Result<Vec<RunDetectorRecord>, CoreError> {
        list_run_detectors(&self.pool, run_id).await
    }

    async fn list_eor_reasons(&self, run_id: i64) -> Result<Vec<EorReasonRecord>, CoreError> {
        list_eor_reasons(&self.pool, run_id).await
    }

    async fn list_reason_types(&self) -> Result<Vec<ReasonType>, CoreError> {
        list_reason_types(&self.pool).await
    }

    async fn apply_run_update(&self, plan: &RunUpdatePlan) -> Result<(), CoreError> {
        apply_run_update(&self.pool, plan).await
    }

    async fn patch_run_timing(&self, run_id: i64, patch: &RunTimingPatch) -> Result<(), CoreError> {
        patch_run_timing(&self.pool, run_id, patch).await
    }

    async fn close_runs(&self, run_ids: &[i64], closed_at: DateTime<Utc>) -> Result<u64, CoreError> {
        close_runs(&self.pool, run_ids, closed_at).await
    }

    async fn list_run_logs(&self, run_number: i64) -> Result<Vec<LogRecord>, CoreError> {
        list_run_logs(&self.pool, run_number).await
    }

    async fn insert_environment(&self, environment: &NewEnvironment) -> Result<(), CoreError> {
        insert_environment(&self.pool, environment).await
    }

    async fn get_environment(&self, id: &str) -> Result<Option<EnvironmentRecord>, CoreError> {
        get_environment(&self.pool, id).await
    }

    async fn list_environments(&self, page: &Page) -> Result<Vec<EnvironmentRecord>, CoreError> {
        list_environments(&self.pool, page).await
    }

    async fn count_environments(&self) -> Result<i64, CoreError> {
        count_environments(&self.pool).await
    }

    async fn update_environment(
        &self,
        id: &str,
        update: &EnvironmentUpdate,
    ) -> Result<(), CoreError> {
        update_environment(&self.pool, id, update).await
    }

    async fn list_environment_history(
        &self,
        id: &str,
    ) -> Result<Vec<EnvironmentHistoryRecord>, CoreError> {
        list_environment_history(&self.pool, id).await
    }

    async fn list_environment_run_numbers(&self, id: &str) -> Result<Vec<i64>, CoreError> {
        list_environment_run_numbers(&self.pool, id).await
    }

    async fn list_active_environments(&self) -> Result<Vec<EnvironmentRecord>, CoreError> {
        list_active_environments(&self.pool).await
    }

    async fn mark_environments_lost(
        &self,
        ids: &[String],
        status_message: &str,
        lost_at: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        mark_environments_lost(&self.pool, ids, status_message, lost_at).await
    }

    async fn insert_lhc_fill(&self, fill: &NewLhcFill) -> Result<(), CoreError> {
        insert_lhc_fill(&self.pool, fill).await
    }

    async fn get_lhc_fill(&self, fill_number: i64) -> Result<Option<LhcFillRecord>, CoreError> {
        get_lhc_fill(&self.pool, fill_number).await
    }

    async fn list_lhc_fills(&self, page: &Page) -> Result<Vec<LhcFillRecord>, CoreError> {
        list_lhc_fills(&self.pool, page).await
    }

    async fn count_lhc_fills(&self) -> Result<i64, CoreError> {
        count_lhc_fills(&self.pool).await
    }

    async fn update_lhc_fill(
        &self,
        fill_number: i64,
        update: &LhcFillUpdate,
    ) -> Result<(), CoreError> {
        update_lhc_fill(&self.pool, fill_number, update).await
    }
}
