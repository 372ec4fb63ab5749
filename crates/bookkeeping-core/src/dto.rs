// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request payloads and their validation.
//!
//! Payloads deserialize into plain structs with loosely typed fields. A
//! separate `validate` pass turns them into the typed commands of
//! [`crate::commands`] or returns every problem found, each naming the
//! offending field (`body.runQuality`, `query.limit`, ...).

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::commands::{
    DetectorQualityUpdate, EnvironmentUpdate, LhcFillUpdate, NewEnvironment, NewEorReason,
    NewLhcFill, NewRun, Page, RunFilter, RunTimingPatch, RunUpdate,
};
use crate::model::{EnvironmentStatus, UnknownVariant, split_detectors};

/// One validation problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{field}\" {message}")]
pub struct ValidationError {
    /// Path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

/// All problems found in one payload.
pub type ValidationErrors = Vec<ValidationError>;

#[derive(Default)]
struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    fn fail(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn required<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.fail(field, "is required");
        }
        value
    }

    fn positive(&mut self, field: &str, value: Option<i64>) -> Option<i64> {
        match value {
            Some(number) if number <= 0 => {
                self.fail(field, "must be a positive integer");
                None
            }
            other => other,
        }
    }

    fn enum_value<T>(&mut self, field: &str, value: Option<&str>) -> Option<T>
    where
        T: FromStr<Err = UnknownVariant>,
    {
        match value?.parse() {
            Ok(parsed) => Some(parsed),
            Err(UnknownVariant { allowed, .. }) => {
                self.fail(field, format!("must be one of [{}]", allowed.join(", ")));
                None
            }
        }
    }

    fn enum_list<T>(&mut self, field: &str, value: Option<&str>) -> Vec<T>
    where
        T: FromStr<Err = UnknownVariant>,
    {
        let Some(value) = value else {
            return Vec::new();
        };
        comma_list(value)
            .filter_map(|item| self.enum_value(field, Some(item)))
            .collect()
    }

    fn integer_list(&mut self, field: &str, value: Option<&str>) -> Vec<i64> {
        let Some(value) = value else {
            return Vec::new();
        };
        let mut numbers = Vec::new();
        for item in comma_list(value) {
            match item.parse() {
                Ok(number) => numbers.push(number),
                Err(_) => {
                    self.fail(field, "must be a comma-separated list of integers");
                    return Vec::new();
                }
            }
        }
        numbers
    }

    fn timestamp(&mut self, field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
        let value = value?;
        match DateTime::parse_from_rfc3339(value) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(_) => {
                self.fail(field, "must be an RFC 3339 date-time");
                None
            }
        }
    }

    fn page(&mut self, offset: Option<i64>, limit: Option<i64>) -> Page {
        let mut page = Page::default();
        if let Some(offset) = offset {
            if offset < 0 {
                self.fail("query.offset", "must be greater than or equal to 0");
            } else {
                page.offset = offset;
            }
        }
        if let Some(limit) = limit {
            if !(1..=Page::MAX_LIMIT).contains(&limit) {
                self.fail(
                    "query.limit",
                    format!("must be between 1 and {}", Page::MAX_LIMIT),
                );
            } else {
                page.limit = limit;
            }
        }
        page
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(value())
        } else {
            Err(self.errors)
        }
    }
}

fn comma_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Body of `POST /api/runs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub run_number: Option<i64>,
    pub environment_id: Option<String>,
    pub fill_number: Option<i64>,
    pub time_o2_start: Option<String>,
    pub time_trg_start: Option<String>,
    /// Comma-joined detector names.
    pub detectors: Option<String>,
    pub trigger_value: Option<String>,
    pub dcs: Option<bool>,
    #[serde(rename = "dd_flp")]
    pub dd_flp: Option<bool>,
    pub epn: Option<bool>,
    pub tfb_dd_mode: Option<String>,
    pub pdp_workflow_parameters: Option<String>,
    pub run_type: Option<String>,
    pub pdp_beam_type: Option<String>,
    pub readout_cfg_uri: Option<String>,
}

impl CreateRunRequest {
    pub fn validate(self) -> Result<NewRun, ValidationErrors> {
        let mut v = Validator::default();
        let run_number = v.positive("body.runNumber", self.run_number);
        let run_number = v.required("body.runNumber", run_number);
        let fill_number = v.positive("body.fillNumber", self.fill_number);
        let time_o2_start = v.timestamp("body.timeO2Start", self.time_o2_start.as_deref());
        let time_trg_start = v.timestamp("body.timeTrgStart", self.time_trg_start.as_deref());
        let detectors = self
            .detectors
            .as_deref()
            .map(|detectors| split_detectors(detectors).map(str::to_string).collect())
            .unwrap_or_default();

        v.finish(|| NewRun {
            run_number: run_number.unwrap_or_default(),
            environment_id: non_blank(self.environment_id),
            fill_number,
            time_o2_start,
            time_trg_start,
            detectors,
            trigger_value: self.trigger_value,
            dcs: self.dcs,
            dd_flp: self.dd_flp,
            epn: self.epn,
            tfb_dd_mode: self.tfb_dd_mode,
            pdp_workflow_parameters: self.pdp_workflow_parameters,
            run_type: non_blank(self.run_type),
            pdp_beam_type: self.pdp_beam_type,
            readout_cfg_uri: non_blank(self.readout_cfg_uri),
        })
    }
}

/// Body of `PATCH /api/runs/{runNumber}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRunRequest {
    pub time_o2_start: Option<String>,
    pub time_o2_end: Option<String>,
    pub time_trg_start: Option<String>,
    pub time_trg_end: Option<String>,
    pub fill_number: Option<i64>,
}

impl PatchRunRequest {
    pub fn validate(self) -> Result<RunTimingPatch, ValidationErrors> {
        let mut v = Validator::default();
        let patch = RunTimingPatch {
            time_o2_start: v.timestamp("body.timeO2Start", self.time_o2_start.as_deref()),
            time_o2_end: v.timestamp("body.timeO2End", self.time_o2_end.as_deref()),
            time_trg_start: v.timestamp("body.timeTrgStart", self.time_trg_start.as_deref()),
            time_trg_end: v.timestamp("body.timeTrgEnd", self.time_trg_end.as_deref()),
            fill_number: v.positive("body.fillNumber", self.fill_number),
        };
        v.finish(|| patch)
    }
}

/// One item of `detectorsQualities`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorQualityRequest {
    pub detector_id: Option<i64>,
    pub quality: Option<String>,
}

/// One item of `eorReasons`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EorReasonRequest {
    pub reason_type_id: Option<i64>,
    pub description: Option<String>,
}

/// Body of `PUT /api/runs/{runNumber}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRunRequest {
    pub run_quality: Option<String>,
    pub run_quality_change_reason: Option<String>,
    pub detectors_qualities: Option<Vec<DetectorQualityRequest>>,
    pub detectors_qualities_change_reason: Option<String>,
    pub calibration_status: Option<String>,
    pub calibration_status_change_reason: Option<String>,
    pub eor_reasons: Option<Vec<EorReasonRequest>>,
}

impl UpdateRunRequest {
    /// Validate the payload; `actor` is recorded as the author of the change.
    pub fn validate(self, actor: Option<String>) -> Result<RunUpdate, ValidationErrors> {
        let mut v = Validator::default();
        let run_quality = v.enum_value("body.runQuality", self.run_quality.as_deref());
        let calibration_status =
            v.enum_value("body.calibrationStatus", self.calibration_status.as_deref());

        let mut detectors_qualities = Vec::new();
        let mut seen_detectors = HashSet::new();
        for (index, item) in self.detectors_qualities.unwrap_or_default().into_iter().enumerate() {
            let detector_field = format!("body.detectorsQualities[{}].detectorId", index);
            let detector_id = v.required(&detector_field, item.detector_id).filter(|id| {
                let first = seen_detectors.insert(*id);
                if !first {
                    v.fail(&detector_field, "must not repeat a detector");
                }
                first
            });
            let quality_field = format!("body.detectorsQualities[{}].quality", index);
            let quality = v.required(&quality_field, item.quality);
            let quality = v.enum_value(&quality_field, quality.as_deref());
            if let (Some(detector_id), Some(quality)) = (detector_id, quality) {
                detectors_qualities.push(DetectorQualityUpdate {
                    detector_id,
                    quality,
                });
            }
        }

        let mut eor_reasons = Vec::new();
        for (index, item) in self.eor_reasons.unwrap_or_default().into_iter().enumerate() {
            let reason_type_id = v.required(
                &format!("body.eorReasons[{}].reasonTypeId", index),
                item.reason_type_id,
            );
            if let Some(reason_type_id) = reason_type_id {
                eor_reasons.push(NewEorReason {
                    reason_type_id,
                    description: non_blank(item.description),
                });
            }
        }

        v.finish(|| RunUpdate {
            run_quality,
            run_quality_change_reason: self.run_quality_change_reason,
            detectors_qualities,
            detectors_qualities_change_reason: self.detectors_qualities_change_reason,
            calibration_status,
            calibration_status_change_reason: self.calibration_status_change_reason,
            eor_reasons,
            actor: non_blank(actor),
        })
    }
}

/// Query string of `GET /api/runs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunListQuery {
    pub run_numbers: Option<String>,
    pub run_qualities: Option<String>,
    pub calibration_statuses: Option<String>,
    pub definitions: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl RunListQuery {
    pub fn validate(self) -> Result<RunFilter, ValidationErrors> {
        let mut v = Validator::default();
        let filter = RunFilter {
            run_numbers: v.integer_list("query.runNumbers", self.run_numbers.as_deref()),
            run_qualities: v.enum_list("query.runQualities", self.run_qualities.as_deref()),
            calibration_statuses: v.enum_list(
                "query.calibrationStatuses",
                self.calibration_statuses.as_deref(),
            ),
            definitions: v.enum_list("query.definitions", self.definitions.as_deref()),
            page: v.page(self.offset, self.limit),
        };
        v.finish(|| filter)
    }
}

/// Query string of the plain paginated listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn validate(self) -> Result<Page, ValidationErrors> {
        let mut v = Validator::default();
        let page = v.page(self.offset, self.limit);
        v.finish(|| page)
    }
}

/// Body of `POST /api/environments`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnvironmentRequest {
    pub id: Option<String>,
    pub status: Option<String>,
    pub status_message: Option<String>,
}

impl CreateEnvironmentRequest {
    pub fn validate(self) -> Result<NewEnvironment, ValidationErrors> {
        let mut v = Validator::default();
        let id = v.required("body.id", non_blank(self.id));
        let status = v
            .enum_value("body.status", self.status.as_deref())
            .unwrap_or(EnvironmentStatus::Standby);
        v.finish(|| NewEnvironment {
            id: id.unwrap_or_default(),
            status,
            status_message: self.status_message,
        })
    }
}

/// Body of `PUT /api/environments/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnvironmentRequest {
    pub status: Option<String>,
    pub status_message: Option<String>,
    pub toredown_at: Option<String>,
}

impl UpdateEnvironmentRequest {
    pub fn validate(self) -> Result<EnvironmentUpdate, ValidationErrors> {
        let mut v = Validator::default();
        let update = EnvironmentUpdate {
            status: v.enum_value("body.status", self.status.as_deref()),
            status_message: self.status_message,
            toredown_at: v.timestamp("body.toredownAt", self.toredown_at.as_deref()),
        };
        v.finish(|| update)
    }
}

/// Body of `POST /api/lhcFills`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLhcFillRequest {
    pub fill_number: Option<i64>,
    pub stable_beams_start: Option<String>,
    pub stable_beams_end: Option<String>,
    pub beam_type: Option<String>,
    pub filling_scheme_name: Option<String>,
}

impl CreateLhcFillRequest {
    pub fn validate(self) -> Result<NewLhcFill, ValidationErrors> {
        let mut v = Validator::default();
        let fill_number = v.positive("body.fillNumber", self.fill_number);
        let fill_number = v.required("body.fillNumber", fill_number);
        let stable_beams_start =
            v.timestamp("body.stableBeamsStart", self.stable_beams_start.as_deref());
        let stable_beams_end = v.timestamp("body.stableBeamsEnd", self.stable_beams_end.as_deref());
        v.finish(|| NewLhcFill {
            fill_number: fill_number.unwrap_or_default(),
            stable_beams_start,
            stable_beams_end,
            beam_type: self.beam_type,
            filling_scheme_name: self.filling_scheme_name,
        })
    }
}

/// Body of `PATCH /api/lhcFills/{fillNumber}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLhcFillRequest {
    pub stable_beams_start: Option<String>,
    pub stable_beams_end: Option<String>,
    pub beam_type: Option<String>,
    pub filling_scheme_name: Option<String>,
}

impl UpdateLhcFillRequest {
    pub fn validate(self) -> Result<LhcFillUpdate, ValidationErrors> {
        let mut v = Validator::default();
        let update = LhcFillUpdate {
            stable_beams_start: v
                .timestamp("body.stableBeamsStart", self.stable_beams_start.as_deref()),
            stable_beams_end: v.timestamp("body.stableBeamsEnd", self.stable_beams_end.as_deref()),
            beam_type: self.beam_type,
            filling_scheme_name: self.filling_scheme_name,
        };
        v.finish(|| update)
    }
}
