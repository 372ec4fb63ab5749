// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validated commands accepted by the services.
//!
//! These are produced by the request validation in [`crate::dto`] and carry
//! only typed values.

use chrono::{DateTime, Utc};

use crate::model::{
    CalibrationStatus, EnvironmentStatus, RunDefinition, RunDetectorQuality, RunQuality,
};

/// A run to register.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRun {
    pub run_number: i64,
    pub environment_id: Option<String>,
    pub fill_number: Option<i64>,
    pub time_o2_start: Option<DateTime<Utc>>,
    pub time_trg_start: Option<DateTime<Utc>>,
    /// Detector names, already split and trimmed.
    pub detectors: Vec<String>,
    pub trigger_value: Option<String>,
    pub dcs: Option<bool>,
    pub dd_flp: Option<bool>,
    pub epn: Option<bool>,
    pub tfb_dd_mode: Option<String>,
    pub pdp_workflow_parameters: Option<String>,
    pub run_type: Option<String>,
    pub pdp_beam_type: Option<String>,
    pub readout_cfg_uri: Option<String>,
}

/// Timing and fill attachment changes of a run.
///
/// Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTimingPatch {
    pub time_o2_start: Option<DateTime<Utc>>,
    pub time_o2_end: Option<DateTime<Utc>>,
    pub time_trg_start: Option<DateTime<Utc>>,
    pub time_trg_end: Option<DateTime<Utc>>,
    pub fill_number: Option<i64>,
}

impl RunTimingPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Requested quality of one detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorQualityUpdate {
    pub detector_id: i64,
    pub quality: RunDetectorQuality,
}

/// A new end-of-run reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEorReason {
    pub reason_type_id: i64,
    pub description: Option<String>,
}

/// Partial update of a run's mutable quality fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub run_quality: Option<RunQuality>,
    pub run_quality_change_reason: Option<String>,
    pub detectors_qualities: Vec<DetectorQualityUpdate>,
    pub detectors_qualities_change_reason: Option<String>,
    pub calibration_status: Option<CalibrationStatus>,
    pub calibration_status_change_reason: Option<String>,
    pub eor_reasons: Vec<NewEorReason>,
    /// Name recorded as the author of the audit entries.
    pub actor: Option<String>,
}

/// Filters of a run listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFilter {
    pub run_numbers: Vec<i64>,
    pub run_qualities: Vec<RunQuality>,
    pub calibration_statuses: Vec<CalibrationStatus>,
    pub definitions: Vec<RunDefinition>,
    pub page: Page,
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    /// Largest accepted page size.
    pub const MAX_LIMIT: i64 = 1000;
    /// Page size used when none is requested.
    pub const DEFAULT_LIMIT: i64 = 100;

    /// Number of pages needed for `total` items.
    pub fn page_count(&self, total: i64) -> i64 {
        if self.limit <= 0 {
            return 0;
        }
        (total + self.limit - 1) / self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// A list slice with its total size.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page_count: i64,
}

/// An environment to register.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEnvironment {
    pub id: String,
    pub status: EnvironmentStatus,
    pub status_message: Option<String>,
}

/// Partial update of an environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentUpdate {
    pub status: Option<EnvironmentStatus>,
    pub status_message: Option<String>,
    pub toredown_at: Option<DateTime<Utc>>,
}

/// An LHC fill to register.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewLhcFill {
    pub fill_number: i64,
    pub stable_beams_start: Option<DateTime<Utc>>,
    pub stable_beams_end: Option<DateTime<Utc>>,
    pub beam_type: Option<String>,
    pub filling_scheme_name: Option<String>,
}

/// Partial update of an LHC fill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LhcFillUpdate {
    pub stable_beams_start: Option<DateTime<Utc>>,
    pub stable_beams_end: Option<DateTime<Utc>>,
    pub beam_type: Option<String>,
    pub filling_scheme_name: Option<String>,
}
