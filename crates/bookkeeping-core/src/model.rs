// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain entities and enumerations.
//!
//! Entities here are the API-facing shape of the bookkeeping data: they are
//! built by the services from persistence records and serialized as JSON
//! with camelCase field names.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A string did not match any variant of a closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' must be one of [{}]", allowed.join(", "))]
pub struct UnknownVariant {
    /// The rejected value.
    pub value: String,
    /// The accepted wire values.
    pub allowed: &'static [&'static str],
}

/// Declares a closed enumeration with a fixed wire representation.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Wire values accepted for this enumeration, in declaration order.
            pub const VALUES: &'static [&'static str] = &[$($value),+];

            /// Wire representation of this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        value: other.to_string(),
                        allowed: Self::VALUES,
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                value.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

wire_enum! {
    /// Global quality of a run.
    ///
    /// Qualities are freely interchangeable; changing one only requires a
    /// justification.
    pub enum RunQuality {
        /// Data usable for physics.
        Good => "good",
        /// Data not usable.
        Bad => "bad",
        /// Test run.
        Test => "test",
        /// No quality assessed.
        None => "none",
    }
}

impl Default for RunQuality {
    fn default() -> Self {
        Self::Good
    }
}

wire_enum! {
    /// Quality of a single detector within a run.
    pub enum RunDetectorQuality {
        /// Detector data usable.
        Good => "good",
        /// Detector data not usable.
        Bad => "bad",
        /// No quality assessed.
        None => "none",
    }
}

impl Default for RunDetectorQuality {
    fn default() -> Self {
        Self::Good
    }
}

wire_enum! {
    /// Outcome of the calibration procedure of a calibration run.
    ///
    /// ```text
    ///   NO_STATUS ◄──► SUCCESS
    ///        ▲            ▲
    ///        └──► FAILED ◄┘   (reason required on every edge touching FAILED)
    /// ```
    pub enum CalibrationStatus {
        /// Calibration not assessed yet (initial state).
        NoStatus => "NO_STATUS",
        /// Calibration succeeded.
        Success => "SUCCESS",
        /// Calibration failed.
        Failed => "FAILED",
    }
}

wire_enum! {
    /// Derived classification of a run's purpose.
    pub enum RunDefinition {
        /// Collisions with stable beams.
        Physics => "PHYSICS",
        /// Full data-taking chain without stable beams.
        Cosmics => "COSMICS",
        /// Technical run.
        Technical => "TECHNICAL",
        /// Replay of recorded data.
        Synthetic => "SYNTHETIC",
    }
}

wire_enum! {
    /// Status of an environment as reported by the control system.
    pub enum EnvironmentStatus {
        /// Environment created, nothing deployed.
        Standby => "STANDBY",
        /// Tasks deployed.
        Deployed => "DEPLOYED",
        /// Tasks configured.
        Configured => "CONFIGURED",
        /// A run is ongoing.
        Running => "RUNNING",
        /// Tasks in heterogeneous states.
        Mixed => "MIXED",
        /// Environment failed (or was declared lost).
        Error => "ERROR",
        /// Environment torn down.
        Destroyed => "DESTROYED",
        /// Environment finished.
        Done => "DONE",
    }
}

impl EnvironmentStatus {
    /// Whether no further transition is expected from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Destroyed | Self::Done)
    }
}

/// Run type prefixes that denote a calibration run.
pub const CALIBRATION_RUN_TYPE_PREFIXES: &[&str] =
    &["CALIBRATION_", "PEDESTAL", "LASER", "PULSER", "NOISE"];

/// Whether the given run type denotes a calibration run.
pub fn is_calibration_run_type(run_type: Option<&str>) -> bool {
    let Some(run_type) = run_type else {
        return false;
    };
    let run_type = run_type.to_ascii_uppercase();
    CALIBRATION_RUN_TYPE_PREFIXES
        .iter()
        .any(|prefix| run_type.starts_with(prefix))
}

/// Splits a comma-joined detector list into trimmed, non-empty names.
pub fn split_detectors(detectors: &str) -> impl Iterator<Item = &str> {
    detectors
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// A data-taking period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: i64,
    pub run_number: i64,
    pub environment_id: Option<String>,
    pub fill_number: Option<i64>,
    pub time_o2_start: Option<DateTime<Utc>>,
    pub time_o2_end: Option<DateTime<Utc>>,
    pub time_trg_start: Option<DateTime<Utc>>,
    pub time_trg_end: Option<DateTime<Utc>>,
    /// Milliseconds between the run start and end, when both are known.
    pub run_duration: Option<i64>,
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
    pub run_quality: RunQuality,
    pub calibration_status: Option<CalibrationStatus>,
    /// Always recomputed from the fields above, never stored.
    pub definition: Option<RunDefinition>,
    pub detectors_qualities: Vec<RunDetector>,
    pub eor_reasons: Vec<EorReason>,
    pub lhc_fill: Option<LhcFill>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Start of the run: trigger start when known, O2 start otherwise.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.time_trg_start.or(self.time_o2_start)
    }

    /// End of the run: trigger end when known, O2 end otherwise.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.time_trg_end.or(self.time_o2_end)
    }

    /// Whether the run physically ended.
    pub fn has_ended(&self) -> bool {
        self.end_time().is_some()
    }

    /// Whether this run's type is a calibration type.
    pub fn is_calibration(&self) -> bool {
        is_calibration_run_type(self.run_type.as_deref())
    }

    /// Look up one of the run's detectors by id.
    pub fn detector(&self, detector_id: i64) -> Option<&RunDetector> {
        self.detectors_qualities
            .iter()
            .find(|detector| detector.id == detector_id)
    }
}

/// Computes a run duration in milliseconds.
pub fn run_duration(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<i64> {
    match (start, end) {
        (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
        _ => None,
    }
}

/// Quality of one detector of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetector {
    /// Detector id.
    pub id: i64,
    pub name: String,
    pub quality: RunDetectorQuality,
}

/// Category of end-of-run reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReasonType {
    pub id: i64,
    pub category: String,
    pub title: String,
}

/// An end-of-run justification attached to a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EorReason {
    pub id: i64,
    pub reason_type_id: i64,
    pub category: String,
    pub title: String,
    pub description: Option<String>,
    pub last_edited_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An execution context of the control system hosting runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    pub status: EnvironmentStatus,
    pub status_message: Option<String>,
    pub toredown_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub runs: Vec<RunReference>,
    pub history: Vec<EnvironmentHistoryItem>,
}

/// Minimal reference to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReference {
    pub run_number: i64,
}

/// One status transition of an environment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentHistoryItem {
    pub status: EnvironmentStatus,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A period of accelerator beam operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LhcFill {
    pub fill_number: i64,
    pub stable_beams_start: Option<DateTime<Utc>>,
    pub stable_beams_end: Option<DateTime<Utc>>,
    /// Seconds of stable beams, when the window is closed.
    pub stable_beams_duration: Option<i64>,
    pub beam_type: Option<String>,
    pub filling_scheme_name: Option<String>,
}

impl LhcFill {
    /// Whether the fill reached stable beams.
    pub fn has_stable_beams(&self) -> bool {
        self.stable_beams_start.is_some()
    }
}

/// An LHC fill together with the runs it exposes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LhcFillWithRuns {
    #[serde(flatten)]
    pub fill: LhcFill,
    /// Empty when the fill never reached stable beams.
    pub runs: Vec<Run>,
}

/// Audit log entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub origin: String,
    pub subtype: String,
    pub author: Option<String>,
    pub run_number: Option<i64>,
    pub created_at: DateTime<Utc>,
}
