// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Use cases over the persistence layer.
//!
//! Services load records, turn them into API entities (computing derived
//! fields such as the run definition) and route writes through the domain
//! rules.

mod environments;
mod lhc_fills;
mod runs;

pub use environments::EnvironmentService;
pub use lhc_fills::LhcFillService;
pub use runs::RunService;

use crate::error::Result;
use crate::model::{
    CalibrationStatus, EnvironmentHistoryItem, EorReason, LhcFill, LogEntry, Run, RunDetector,
    run_duration,
};
use crate::persistence::{
    EnvironmentHistoryRecord, EorReasonRecord, LhcFillRecord, LogRecord, RunDetectorRecord,
    RunRecord,
};

impl From<LhcFillRecord> for LhcFill {
    fn from(record: LhcFillRecord) -> Self {
        let stable_beams_duration = match (record.stable_beams_start, record.stable_beams_end) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        };
        Self {
            fill_number: record.fill_number,
            stable_beams_start: record.stable_beams_start,
            stable_beams_end: record.stable_beams_end,
            stable_beams_duration,
            beam_type: record.beam_type,
            filling_scheme_name: record.filling_scheme_name,
        }
    }
}

impl From<LogRecord> for LogEntry {
    fn from(record: LogRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            text: record.text,
            origin: record.origin,
            subtype: record.subtype,
            author: record.author,
            run_number: record.run_number,
            created_at: record.created_at,
        }
    }
}

impl From<EorReasonRecord> for EorReason {
    fn from(record: EorReasonRecord) -> Self {
        Self {
            id: record.id,
            reason_type_id: record.reason_type_id,
            category: record.category,
            title: record.title,
            description: record.description,
            last_edited_name: record.last_edited_name,
            created_at: record.created_at,
        }
    }
}

fn detector_from_record(record: RunDetectorRecord) -> Result<RunDetector> {
    Ok(RunDetector {
        id: record.detector_id,
        name: record.name,
        quality: record.quality.parse()?,
    })
}

fn history_item_from_record(record: EnvironmentHistoryRecord) -> Result<EnvironmentHistoryItem> {
    Ok(EnvironmentHistoryItem {
        status: record.status.parse()?,
        status_message: record.status_message,
        created_at: record.created_at,
    })
}

/// Build a run entity. The definition is computed here, never read back.
fn run_from_parts(
    record: RunRecord,
    lhc_fill: Option<LhcFill>,
    detectors: Vec<RunDetectorRecord>,
    eor_reasons: Vec<EorReasonRecord>,
) -> Result<Run> {
    let calibration_status: Option<CalibrationStatus> = record
        .calibration_status
        .as_deref()
        .map(str::parse)
        .transpose()?;
    let detectors_qualities = detectors
        .into_iter()
        .map(detector_from_record)
        .collect::<Result<Vec<_>>>()?;

    let mut run = Run {
        id: record.id,
        run_number: record.run_number,
        environment_id: record.environment_id,
        fill_number: record.fill_number,
        time_o2_start: record.time_o2_start,
        time_o2_end: record.time_o2_end,
        time_trg_start: record.time_trg_start,
        time_trg_end: record.time_trg_end,
        run_duration: None,
        detectors: record.detectors,
        trigger_value: record.trigger_value,
        dcs: record.dcs,
        dd_flp: record.dd_flp,
        epn: record.epn,
        tfb_dd_mode: record.tfb_dd_mode,
        pdp_workflow_parameters: record.pdp_workflow_parameters,
        run_type: record.run_type,
        pdp_beam_type: record.pdp_beam_type,
        readout_cfg_uri: record.readout_cfg_uri,
        run_quality: record.run_quality.parse()?,
        calibration_status,
        definition: None,
        detectors_qualities,
        eor_reasons: eor_reasons.into_iter().map(EorReason::from).collect(),
        lhc_fill,
        created_at: record.created_at,
        updated_at: record.updated_at,
    };
    run.run_duration = run_duration(run.start_time(), run.end_time());
    run.definition = crate::definition::classify_run(&run);
    Ok(run)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use sqlx::sqlite::SqlitePoolOptions;

    use crate::persistence::{Persistence, SqlitePersistence};

    /// In-memory SQLite store with the schema applied.
    pub async fn persistence() -> Arc<dyn Persistence> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        crate::migrations::SQLITE
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        Arc::new(SqlitePersistence::new(pool))
    }
}
