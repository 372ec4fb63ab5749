// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run lifecycle rules.
//!
//! Pure functions deciding whether a change of a run's quality fields is
//! acceptable given the run's current state. Nothing here touches storage:
//! [`plan_update`] turns a validated [`RunUpdate`] into a [`RunUpdatePlan`]
//! that the run service persists in a single transaction, or rejects the
//! whole update with the first broken rule.
//!
//! Rules:
//!
//! - Run quality values are freely interchangeable. A change needs a
//!   non-blank justification.
//! - Detector qualities can only change on a run that ended, for detectors
//!   that belong to the run. A change needs a non-blank justification.
//! - Calibration status is reserved to calibration runs. A justification is
//!   required exactly when the current or the new status is `FAILED`, and
//!   rejected otherwise.
//! - End-of-run reasons are appended and must reference existing reason
//!   types.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::commands::{NewEorReason, RunUpdate};
use crate::error::{CoreError, JustifiedField, Result};
use crate::model::{CalibrationStatus, ReasonType, Run, RunDetectorQuality, RunQuality};

/// Origin recorded on audit entries written by the lifecycle rules.
pub const AUDIT_ORIGIN: &str = "process";
/// Subtype recorded on audit entries written by the lifecycle rules.
pub const AUDIT_SUBTYPE: &str = "run";

/// A field moving from one value to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange<T> {
    pub previous: T,
    pub next: T,
    /// Trimmed justification, when one was given.
    pub reason: Option<String>,
}

/// A detector quality moving from one value to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorQualityChange {
    pub detector_id: i64,
    pub name: String,
    pub previous: RunDetectorQuality,
    pub next: RunDetectorQuality,
}

/// An end-of-run reason checked against its reason type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEorReason {
    pub reason_type: ReasonType,
    pub description: Option<String>,
}

/// Audit entry to append alongside a run change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub title: String,
    pub text: String,
    pub origin: String,
    pub subtype: String,
    pub author: Option<String>,
    pub run_number: i64,
}

/// Everything an accepted run update writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunUpdatePlan {
    pub run_id: i64,
    pub run_number: i64,
    pub run_quality: Option<FieldChange<RunQuality>>,
    pub detector_qualities: Vec<DetectorQualityChange>,
    pub detectors_qualities_change_reason: Option<String>,
    pub calibration_status: Option<FieldChange<CalibrationStatus>>,
    pub eor_reasons: Vec<PlannedEorReason>,
    /// Recorded as `last_edited_name` of the new EOR reasons.
    pub actor: Option<String>,
    pub audit_entries: Vec<NewLogEntry>,
}

impl RunUpdatePlan {
    /// Whether applying the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.run_quality.is_none()
            && self.detector_qualities.is_empty()
            && self.calibration_status.is_none()
            && self.eor_reasons.is_empty()
    }
}

/// Trimmed justification, or `None` when absent or blank.
pub fn justification(reason: Option<&str>) -> Option<&str> {
    reason.map(str::trim).filter(|reason| !reason.is_empty())
}

/// Check a change of the global run quality.
///
/// Returns `None` when the quality is unchanged.
pub fn update_quality(
    run: &Run,
    quality: RunQuality,
    reason: Option<&str>,
) -> Result<Option<FieldChange<RunQuality>>> {
    if quality == run.run_quality {
        return Ok(None);
    }
    let reason = justification(reason).ok_or(CoreError::MissingJustification {
        field: JustifiedField::RunQuality,
    })?;
    Ok(Some(FieldChange {
        previous: run.run_quality,
        next: quality,
        reason: Some(reason.to_string()),
    }))
}

/// Check a change of one detector's quality.
///
/// Returns `None` when the quality is unchanged.
pub fn update_detector_quality(
    run: &Run,
    detector_id: i64,
    quality: RunDetectorQuality,
    reason: Option<&str>,
) -> Result<Option<DetectorQualityChange>> {
    if !run.has_ended() {
        return Err(CoreError::RunNotEnded {
            run_number: run.run_number,
        });
    }
    let detector = run
        .detector(detector_id)
        .ok_or(CoreError::DetectorNotFound {
            run_number: run.run_number,
            detector_id,
        })?;
    if detector.quality == quality {
        return Ok(None);
    }
    if justification(reason).is_none() {
        return Err(CoreError::MissingJustification {
            field: JustifiedField::DetectorsQualities,
        });
    }
    Ok(Some(DetectorQualityChange {
        detector_id,
        name: detector.name.clone(),
        previous: detector.quality,
        next: quality,
    }))
}

/// Check a change of the calibration status.
///
/// A calibration run without a stored status is considered `NO_STATUS`.
/// Returns `None` when the status is unchanged.
pub fn update_calibration_status(
    run: &Run,
    status: CalibrationStatus,
    reason: Option<&str>,
) -> Result<Option<FieldChange<CalibrationStatus>>> {
    if !run.is_calibration() {
        return Err(CoreError::NotCalibrationRun {
            run_number: run.run_number,
        });
    }

    let current = run.calibration_status.unwrap_or(CalibrationStatus::NoStatus);
    let involves_failed = current == CalibrationStatus::Failed || status == CalibrationStatus::Failed;
    let reason = justification(reason);
    match (involves_failed, reason) {
        (true, None) => {
            return Err(CoreError::MissingJustification {
                field: JustifiedField::CalibrationStatus,
            });
        }
        (false, Some(_)) => return Err(CoreError::UnexpectedJustification),
        _ => {}
    }

    if current == status {
        return Ok(None);
    }
    Ok(Some(FieldChange {
        previous: current,
        next: status,
        reason: reason.map(str::to_string),
    }))
}

/// Check end-of-run reasons against the known reason types.
pub fn add_eor_reasons(
    reasons: &[NewEorReason],
    reason_types: &[ReasonType],
) -> Result<Vec<PlannedEorReason>> {
    let unknown: BTreeSet<i64> = reasons
        .iter()
        .map(|reason| reason.reason_type_id)
        .filter(|id| !reason_types.iter().any(|reason_type| reason_type.id == *id))
        .collect();
    if !unknown.is_empty() {
        return Err(CoreError::InvalidReasonType {
            reason_type_ids: unknown.into_iter().collect(),
        });
    }

    Ok(reasons
        .iter()
        .filter_map(|reason| {
            reason_types
                .iter()
                .find(|reason_type| reason_type.id == reason.reason_type_id)
                .map(|reason_type| PlannedEorReason {
                    reason_type: reason_type.clone(),
                    description: reason.description.clone(),
                })
        })
        .collect())
}

/// Apply every rule to an update request.
///
/// Either the whole update is accepted or the first violation is returned.
pub fn plan_update(
    run: &Run,
    update: &RunUpdate,
    reason_types: &[ReasonType],
) -> Result<RunUpdatePlan> {
    let run_quality = match update.run_quality {
        Some(quality) => update_quality(run, quality, update.run_quality_change_reason.as_deref())?,
        None => None,
    };

    let detectors_reason = update.detectors_qualities_change_reason.as_deref();
    let mut detector_qualities = Vec::new();
    for requested in &update.detectors_qualities {
        if let Some(change) =
            update_detector_quality(run, requested.detector_id, requested.quality, detectors_reason)?
        {
            detector_qualities.push(change);
        }
    }

    let calibration_status = match update.calibration_status {
        Some(status) => update_calibration_status(
            run,
            status,
            update.calibration_status_change_reason.as_deref(),
        )?,
        None => None,
    };

    let eor_reasons = add_eor_reasons(&update.eor_reasons, reason_types)?;

    let actor = update.actor.as_deref();
    let mut audit_entries = Vec::new();
    if let Some(change) = &run_quality {
        audit_entries.push(run_quality_entry(run.run_number, change, actor));
    }
    let detectors_qualities_change_reason = justification(detectors_reason).map(str::to_string);
    if !detector_qualities.is_empty() {
        audit_entries.push(detector_qualities_entry(
            run.run_number,
            &detector_qualities,
            detectors_qualities_change_reason.as_deref(),
            actor,
        ));
    }
    if let Some(change) = &calibration_status {
        audit_entries.push(calibration_status_entry(run.run_number, change, actor));
    }
    if !eor_reasons.is_empty() {
        audit_entries.push(eor_reasons_entry(run.run_number, &eor_reasons, actor));
    }

    Ok(RunUpdatePlan {
        run_id: run.id,
        run_number: run.run_number,
        run_quality,
        detector_qualities,
        detectors_qualities_change_reason,
        calibration_status,
        eor_reasons,
        actor: update.actor.clone(),
        audit_entries,
    })
}

fn by_actor(actor: Option<&str>) -> String {
    actor.map(|name| format!(" by {}", name)).unwrap_or_default()
}

fn audit_entry(run_number: i64, title: String, text: String, actor: Option<&str>) -> NewLogEntry {
    NewLogEntry {
        title,
        text,
        origin: AUDIT_ORIGIN.to_string(),
        subtype: AUDIT_SUBTYPE.to_string(),
        author: actor.map(str::to_string),
        run_number,
    }
}

fn run_quality_entry(run_number: i64, change: &FieldChange<RunQuality>, actor: Option<&str>) -> NewLogEntry {
    let mut text = format!(
        "The run quality for run {} has been changed from {} to {}{}",
        run_number,
        change.previous,
        change.next,
        by_actor(actor)
    );
    if let Some(reason) = &change.reason {
        let _ = write!(text, "\nReason: {}", reason);
    }
    audit_entry(
        run_number,
        format!("Run {} quality has changed to {}", run_number, change.next),
        text,
        actor,
    )
}

fn detector_qualities_entry(
    run_number: i64,
    changes: &[DetectorQualityChange],
    reason: Option<&str>,
    actor: Option<&str>,
) -> NewLogEntry {
    let mut text = format!(
        "Here are the updated detector's qualities for run {}{}:",
        run_number,
        by_actor(actor)
    );
    for change in changes {
        let _ = write!(text, "\n- {}: {} -> {}", change.name, change.previous, change.next);
    }
    if let Some(reason) = reason {
        let _ = write!(text, "\nReason: {}", reason);
    }
    audit_entry(
        run_number,
        format!("Detector(s) quality for run {} has been changed", run_number),
        text,
        actor,
    )
}

fn calibration_status_entry(
    run_number: i64,
    change: &FieldChange<CalibrationStatus>,
    actor: Option<&str>,
) -> NewLogEntry {
    let mut text = format!(
        "The calibration status for run {} has been changed from {} to {}{}",
        run_number,
        change.previous,
        change.next,
        by_actor(actor)
    );
    if let Some(reason) = &change.reason {
        let _ = write!(text, "\nReason: {}", reason);
    }
    audit_entry(
        run_number,
        format!("Calibration status for run {} has changed to {}", run_number, change.next),
        text,
        actor,
    )
}

fn eor_reasons_entry(run_number: i64, reasons: &[PlannedEorReason], actor: Option<&str>) -> NewLogEntry {
    let mut text = format!(
        "End of run reasons for run {} have been added{}.\nThe new EoR reasons are:",
        run_number,
        by_actor(actor)
    );
    for reason in reasons {
        let _ = write!(
            text,
            "\n- {} - {}",
            reason.reason_type.category, reason.reason_type.title
        );
        if let Some(description) = &reason.description {
            let _ = write!(text, " - {}", description);
        }
    }
    audit_entry(
        run_number,
        format!("EoR reason has changed for run {}", run_number),
        text,
        actor,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::DetectorQualityUpdate;
    use crate::model::RunDetector;
    use chrono::{TimeZone, Utc};

    fn run(run_type: &str) -> Run {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        Run {
            id: 40,
            run_number: 40,
            environment_id: None,
            fill_number: None,
            time_o2_start: Some(created),
            time_o2_end: None,
            time_trg_start: None,
            time_trg_end: None,
            run_duration: None,
            detectors: Some("CPV,TPC".to_string()),
            trigger_value: None,
            dcs: None,
            dd_flp: None,
            epn: None,
            tfb_dd_mode: None,
            pdp_workflow_parameters: None,
            run_type: Some(run_type.to_string()),
            pdp_beam_type: None,
            readout_cfg_uri: None,
            run_quality: RunQuality::Good,
            calibration_status: None,
            definition: None,
            detectors_qualities: vec![
                RunDetector {
                    id: 1,
                    name: "CPV".to_string(),
                    quality: RunDetectorQuality::Good,
                },
                RunDetector {
                    id: 2,
                    name: "TPC".to_string(),
                    quality: RunDetectorQuality::Good,
                },
            ],
            eor_reasons: Vec::new(),
            lhc_fill: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn ended(mut run: Run) -> Run {
        run.time_o2_end = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        run
    }

    fn reason_types() -> Vec<ReasonType> {
        vec![
            ReasonType {
                id: 1,
                category: "DETECTORS".to_string(),
                title: "CPV".to_string(),
            },
            ReasonType {
                id: 2,
                category: "OTHER".to_string(),
                title: "Some-other".to_string(),
            },
        ]
    }

    #[test]
    fn test_same_quality_needs_no_reason() {
        let run = run("PHYSICS");
        assert_eq!(update_quality(&run, RunQuality::Good, None).unwrap(), None);
    }

    #[test]
    fn test_quality_change_requires_reason() {
        let run = run("PHYSICS");
        for reason in [None, Some(""), Some("   ")] {
            let err = update_quality(&run, RunQuality::Bad, reason).unwrap_err();
            assert_eq!(
                err,
                CoreError::MissingJustification {
                    field: JustifiedField::RunQuality
                }
            );
        }
    }

    #[test]
    fn test_quality_change_with_reason() {
        let run = run("PHYSICS");
        let change = update_quality(&run, RunQuality::Test, Some("  beam dump ")).unwrap().unwrap();
        assert_eq!(change.previous, RunQuality::Good);
        assert_eq!(change.next, RunQuality::Test);
        assert_eq!(change.reason.as_deref(), Some("beam dump"));
    }

    #[test]
    fn test_detector_quality_on_running_run() {
        let run = run("PHYSICS");
        for reason in [None, Some("valid reason")] {
            let err = update_detector_quality(&run, 1, RunDetectorQuality::Bad, reason).unwrap_err();
            assert_eq!(err, CoreError::RunNotEnded { run_number: 40 });
        }
    }

    #[test]
    fn test_detector_quality_with_trigger_end_only() {
        let mut run = run("PHYSICS");
        run.time_trg_end = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let change = update_detector_quality(&run, 2, RunDetectorQuality::Bad, Some("noisy"))
            .unwrap()
            .unwrap();
        assert_eq!(change.name, "TPC");
    }

    #[test]
    fn test_unknown_detector() {
        let run = ended(run("PHYSICS"));
        let err = update_detector_quality(&run, 9999, RunDetectorQuality::Bad, Some("x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "This run's detector with runNumber: (40) and with detector Id: (9999) could not be found"
        );
    }

    #[test]
    fn test_detector_quality_change_requires_reason() {
        let run = ended(run("PHYSICS"));
        assert_eq!(
            update_detector_quality(&run, 1, RunDetectorQuality::Bad, Some(" ")).unwrap_err(),
            CoreError::MissingJustification {
                field: JustifiedField::DetectorsQualities
            }
        );
        assert_eq!(
            update_detector_quality(&run, 1, RunDetectorQuality::Good, None).unwrap(),
            None
        );
    }

    #[test]
    fn test_calibration_status_reserved_to_calibration_runs() {
        let run = run("PHYSICS");
        for (status, reason) in [
            (CalibrationStatus::Failed, Some("valid reason")),
            (CalibrationStatus::Success, None),
            (CalibrationStatus::NoStatus, Some("")),
        ] {
            let err = update_calibration_status(&run, status, reason).unwrap_err();
            assert_eq!(err, CoreError::NotCalibrationRun { run_number: 40 });
        }
    }

    #[test]
    fn test_calibration_failed_requires_reason() {
        let run = run("CALIBRATION_ITS");
        assert_eq!(
            update_calibration_status(&run, CalibrationStatus::Failed, Some("")).unwrap_err(),
            CoreError::MissingJustification {
                field: JustifiedField::CalibrationStatus
            }
        );
        let change = update_calibration_status(&run, CalibrationStatus::Failed, Some("valid reason"))
            .unwrap()
            .unwrap();
        assert_eq!(change.previous, CalibrationStatus::NoStatus);
        assert_eq!(change.reason.as_deref(), Some("valid reason"));
    }

    #[test]
    fn test_calibration_reason_outside_failed_is_rejected() {
        let run = run("PEDESTAL");
        assert_eq!(
            update_calibration_status(&run, CalibrationStatus::Success, Some("A spurious reason"))
                .unwrap_err(),
            CoreError::UnexpectedJustification
        );
    }

    #[test]
    fn test_calibration_run_40_scenario() {
        let mut run = run("CALIBRATION_TPC");
        run.calibration_status = Some(CalibrationStatus::NoStatus);

        let change = update_calibration_status(&run, CalibrationStatus::Success, None)
            .unwrap()
            .unwrap();
        run.calibration_status = Some(change.next);

        assert!(matches!(
            update_calibration_status(&run, CalibrationStatus::Failed, None),
            Err(CoreError::MissingJustification { .. })
        ));

        let change = update_calibration_status(&run, CalibrationStatus::Failed, Some("X"))
            .unwrap()
            .unwrap();
        run.calibration_status = Some(change.next);

        assert!(matches!(
            update_calibration_status(&run, CalibrationStatus::Success, None),
            Err(CoreError::MissingJustification { .. })
        ));
    }

    #[test]
    fn test_unknown_reason_types() {
        let reasons = vec![
            NewEorReason {
                reason_type_id: 1,
                description: None,
            },
            NewEorReason {
                reason_type_id: 999,
                description: Some("x".to_string()),
            },
        ];
        let err = add_eor_reasons(&reasons, &reason_types()).unwrap_err();
        assert_eq!(err.to_string(), "Provided reason types do not exist");
    }

    #[test]
    fn test_plan_collects_changes_and_audit_entries() {
        let run = ended(run("CALIBRATION_TPC"));
        let update = RunUpdate {
            run_quality: Some(RunQuality::Bad),
            run_quality_change_reason: Some("bad beam".to_string()),
            detectors_qualities: vec![
                DetectorQualityUpdate {
                    detector_id: 1,
                    quality: RunDetectorQuality::Bad,
                },
                DetectorQualityUpdate {
                    detector_id: 2,
                    quality: RunDetectorQuality::Good,
                },
            ],
            detectors_qualities_change_reason: Some("CPV noisy".to_string()),
            calibration_status: Some(CalibrationStatus::Success),
            eor_reasons: vec![NewEorReason {
                reason_type_id: 2,
                description: Some("Power cut".to_string()),
            }],
            actor: Some("Jan Kowalski".to_string()),
            ..Default::default()
        };

        let plan = plan_update(&run, &update, &reason_types()).unwrap();
        assert!(!plan.is_empty());
        assert_eq!(plan.detector_qualities.len(), 1);
        assert_eq!(plan.eor_reasons[0].reason_type.title, "Some-other");
        assert_eq!(plan.audit_entries.len(), 4);
        assert!(plan.audit_entries.iter().all(|entry| entry.run_number == 40));
        assert!(plan.audit_entries[0].text.contains("from good to bad by Jan Kowalski"));
        assert!(plan.audit_entries[0].text.ends_with("Reason: bad beam"));
        assert!(plan.audit_entries[1].text.contains("- CPV: good -> bad"));
        assert!(plan.audit_entries[3].text.contains("OTHER - Some-other - Power cut"));
    }

    #[test]
    fn test_plan_is_all_or_nothing() {
        let run = run("PHYSICS");
        let update = RunUpdate {
            run_quality: Some(RunQuality::Bad),
            run_quality_change_reason: Some("bad beam".to_string()),
            calibration_status: Some(CalibrationStatus::Success),
            ..Default::default()
        };
        assert_eq!(
            plan_update(&run, &update, &reason_types()).unwrap_err(),
            CoreError::NotCalibrationRun { run_number: 40 }
        );
    }

    #[test]
    fn test_empty_update_plans_nothing() {
        let run = run("PHYSICS");
        let plan = plan_update(&run, &RunUpdate::default(), &[]).unwrap();
        assert!(plan.is_empty());
        assert!(plan.audit_entries.is_empty());
    }
}
