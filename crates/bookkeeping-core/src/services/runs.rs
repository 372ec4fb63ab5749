// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run use cases.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::commands::{NewRun, Page, Paginated, RunFilter, RunTimingPatch, RunUpdate};
use crate::definition::{ClassificationInput, classify};
use crate::error::{CoreError, Result};
use crate::lifecycle::plan_update;
use crate::model::{
    CalibrationStatus, LhcFill, LogEntry, ReasonType, Run, RunDefinition,
    is_calibration_run_type,
};
use crate::persistence::{Persistence, RunQuery, RunRecord};

use super::run_from_parts;

/// Runs: registration, reads, quality updates and timing patches.
#[derive(Clone)]
pub struct RunService {
    persistence: Arc<dyn Persistence>,
}

impl RunService {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Register a new run.
    ///
    /// Calibration runs start with `NO_STATUS`; other runs carry no
    /// calibration status.
    pub async fn create(&self, new_run: &NewRun) -> Result<Run> {
        if self.persistence.get_run(new_run.run_number).await?.is_some() {
            return Err(CoreError::RunAlreadyExists {
                run_number: new_run.run_number,
            });
        }
        if let Some(environment_id) = &new_run.environment_id
            && self.persistence.get_environment(environment_id).await?.is_none()
        {
            return Err(CoreError::EnvironmentNotFound {
                environment_id: environment_id.clone(),
            });
        }
        if let Some(fill_number) = new_run.fill_number {
            self.require_fill(fill_number).await?;
        }

        let calibration_status = is_calibration_run_type(new_run.run_type.as_deref())
            .then_some(CalibrationStatus::NoStatus);
        self.persistence
            .insert_run(new_run, calibration_status)
            .await?;

        info!(run_number = new_run.run_number, "Run created");
        self.get(new_run.run_number).await
    }

    /// Load a run with its fill, detectors and EOR reasons.
    pub async fn get(&self, run_number: i64) -> Result<Run> {
        let record = self.find_record(run_number).await?;
        let fill = self.load_fill(&mut HashMap::new(), record.fill_number).await?;
        self.hydrate(record, fill).await
    }

    /// List runs, most recent run number first.
    pub async fn list(&self, filter: &RunFilter) -> Result<Paginated<Run>> {
        let query = RunQuery {
            run_numbers: filter.run_numbers.clone(),
            run_qualities: filter
                .run_qualities
                .iter()
                .map(|quality| quality.as_str().to_string())
                .collect(),
            calibration_statuses: filter
                .calibration_statuses
                .iter()
                .map(|status| status.as_str().to_string())
                .collect(),
            ..Default::default()
        };
        let records = self.persistence.list_runs(&query).await?;
        self.paginate(records, &filter.definitions, &filter.page).await
    }

    /// Every run attached to a fill.
    pub async fn list_for_fill(&self, fill_number: i64) -> Result<Vec<Run>> {
        let query = RunQuery {
            fill_number: Some(fill_number),
            ..Default::default()
        };
        let records = self.persistence.list_runs(&query).await?;
        let mut fills = HashMap::new();
        let mut runs = Vec::with_capacity(records.len());
        for record in records {
            let fill = self.load_fill(&mut fills, record.fill_number).await?;
            runs.push(self.hydrate(record, fill).await?);
        }
        Ok(runs)
    }

    /// Apply a quality/status/EOR update through the lifecycle rules.
    ///
    /// Nothing is written when any rule rejects the update.
    pub async fn update(&self, run_number: i64, update: &RunUpdate) -> Result<Run> {
        let run = self.get(run_number).await?;
        let reason_types = if update.eor_reasons.is_empty() {
            Vec::new()
        } else {
            self.persistence.list_reason_types().await?
        };

        let plan = plan_update(&run, update, &reason_types).inspect_err(|e| {
            debug!(run_number, error = %e, "Run update rejected");
        })?;
        if plan.is_empty() {
            return Ok(run);
        }

        self.persistence.apply_run_update(&plan).await?;
        info!(
            run_number,
            audit_entries = plan.audit_entries.len(),
            "Run updated"
        );
        self.get(run_number).await
    }

    /// Set start/end timestamps and the fill of a run.
    pub async fn patch_timing(&self, run_number: i64, patch: &RunTimingPatch) -> Result<Run> {
        let record = self.find_record(run_number).await?;
        if let Some(fill_number) = patch.fill_number {
            self.require_fill(fill_number).await?;
        }
        if !patch.is_empty() {
            self.persistence.patch_run_timing(record.id, patch).await?;
            debug!(run_number, "Run timing patched");
        }
        self.get(run_number).await
    }

    /// All EOR reason types.
    pub async fn reason_types(&self) -> Result<Vec<ReasonType>> {
        self.persistence.list_reason_types().await
    }

    /// Audit entries written for a run.
    pub async fn logs(&self, run_number: i64) -> Result<Vec<LogEntry>> {
        self.find_record(run_number).await?;
        let records = self.persistence.list_run_logs(run_number).await?;
        Ok(records.into_iter().map(LogEntry::from).collect())
    }

    async fn find_record(&self, run_number: i64) -> Result<RunRecord> {
        self.persistence
            .get_run(run_number)
            .await?
            .ok_or(CoreError::RunNotFound { run_number })
    }

    async fn require_fill(&self, fill_number: i64) -> Result<()> {
        match self.persistence.get_lhc_fill(fill_number).await? {
            Some(_) => Ok(()),
            None => Err(CoreError::LhcFillNotFound { fill_number }),
        }
    }

    async fn load_fill(
        &self,
        cache: &mut HashMap<i64, Option<LhcFill>>,
        fill_number: Option<i64>,
    ) -> Result<Option<LhcFill>> {
        let Some(fill_number) = fill_number else {
            return Ok(None);
        };
        if let Some(cached) = cache.get(&fill_number) {
            return Ok(cached.clone());
        }
        let fill = self
            .persistence
            .get_lhc_fill(fill_number)
            .await?
            .map(LhcFill::from);
        cache.insert(fill_number, fill.clone());
        Ok(fill)
    }

    async fn hydrate(&self, record: RunRecord, fill: Option<LhcFill>) -> Result<Run> {
        let detectors = self.persistence.list_run_detectors(record.id).await?;
        let eor_reasons = self.persistence.list_eor_reasons(record.id).await?;
        run_from_parts(record, fill, detectors, eor_reasons)
    }

    // The definition is never stored, so filtering on it and paginating the
    // result happen here rather than in the query.
    async fn paginate(
        &self,
        records: Vec<RunRecord>,
        definitions: &[RunDefinition],
        page: &Page,
    ) -> Result<Paginated<Run>> {
        let mut fills = HashMap::new();
        let mut selected = Vec::with_capacity(records.len());
        for record in records {
            let fill = self.load_fill(&mut fills, record.fill_number).await?;
            if !definitions.is_empty() {
                let definition = classify(&classification_input(&record, fill.as_ref()));
                if !definition.is_some_and(|definition| definitions.contains(&definition)) {
                    continue;
                }
            }
            selected.push((record, fill));
        }

        let total_count = selected.len() as i64;
        let offset = usize::try_from(page.offset).unwrap_or_default();
        let limit = usize::try_from(page.limit).unwrap_or_default();
        let mut items = Vec::with_capacity(limit.min(selected.len()));
        for (record, fill) in selected.into_iter().skip(offset).take(limit) {
            items.push(self.hydrate(record, fill).await?);
        }

        Ok(Paginated {
            items,
            total_count,
            page_count: page.page_count(total_count),
        })
    }
}

fn classification_input<'a>(
    record: &'a RunRecord,
    lhc_fill: Option<&'a LhcFill>,
) -> ClassificationInput<'a> {
    ClassificationInput {
        detectors: record.detectors.as_deref(),
        lhc_fill,
        trigger_value: record.trigger_value.as_deref(),
        dcs: record.dcs,
        dd_flp: record.dd_flp,
        epn: record.epn,
        tfb_dd_mode: record.tfb_dd_mode.as_deref(),
        pdp_workflow_parameters: record.pdp_workflow_parameters.as_deref(),
        run_type: record.run_type.as_deref(),
        pdp_beam_type: record.pdp_beam_type.as_deref(),
        readout_cfg_uri: record.readout_cfg_uri.as_deref(),
    }
}
