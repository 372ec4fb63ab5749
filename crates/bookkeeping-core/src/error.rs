// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for bookkeeping-core.
//!
//! Provides a unified error type for the domain rules, the services and the
//! persistence layer. The `Display` output of rule violations is the message
//! surfaced to API clients.

use std::fmt;

use crate::model::UnknownVariant;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Field whose change needs a justification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifiedField {
    /// The global run quality.
    RunQuality,
    /// One or more detector qualities.
    DetectorsQualities,
    /// The calibration status.
    CalibrationStatus,
}

/// Core errors that can occur during request processing.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreError {
    /// Run was not found in the database.
    RunNotFound {
        /// The run number that was not found.
        run_number: i64,
    },

    /// Run already exists (duplicate run number).
    RunAlreadyExists {
        /// The run number that already exists.
        run_number: i64,
    },

    /// A change was requested without the required justification.
    MissingJustification {
        /// The field being changed.
        field: JustifiedField,
    },

    /// A calibration justification was supplied where none is allowed.
    UnexpectedJustification,

    /// Detector qualities can only change once the run ended.
    RunNotEnded {
        /// The run number.
        run_number: i64,
    },

    /// Calibration status is only meaningful for calibration runs.
    NotCalibrationRun {
        /// The run number.
        run_number: i64,
    },

    /// The detector is not part of the run.
    DetectorNotFound {
        /// The run number.
        run_number: i64,
        /// The detector ID that was not found.
        detector_id: i64,
    },

    /// At least one EOR reason type id does not exist.
    InvalidReasonType {
        /// The unknown ids.
        reason_type_ids: Vec<i64>,
    },

    /// Environment was not found.
    EnvironmentNotFound {
        /// The environment ID that was not found.
        environment_id: String,
    },

    /// Environment already exists.
    EnvironmentAlreadyExists {
        /// The environment ID that already exists.
        environment_id: String,
    },

    /// LHC fill was not found.
    LhcFillNotFound {
        /// The fill number that was not found.
        fill_number: i64,
    },

    /// LHC fill already exists.
    LhcFillAlreadyExists {
        /// The fill number that already exists.
        fill_number: i64,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RunNotFound { .. } => "RUN_NOT_FOUND",
            Self::RunAlreadyExists { .. } => "RUN_ALREADY_EXISTS",
            Self::MissingJustification { .. } => "MISSING_JUSTIFICATION",
            Self::UnexpectedJustification => "UNEXPECTED_JUSTIFICATION",
            Self::RunNotEnded { .. } => "RUN_NOT_ENDED",
            Self::NotCalibrationRun { .. } => "NOT_CALIBRATION_RUN",
            Self::DetectorNotFound { .. } => "DETECTOR_NOT_FOUND",
            Self::InvalidReasonType { .. } => "INVALID_REASON_TYPE",
            Self::EnvironmentNotFound { .. } => "ENVIRONMENT_NOT_FOUND",
            Self::EnvironmentAlreadyExists { .. } => "ENVIRONMENT_ALREADY_EXISTS",
            Self::LhcFillNotFound { .. } => "LHC_FILL_NOT_FOUND",
            Self::LhcFillAlreadyExists { .. } => "LHC_FILL_ALREADY_EXISTS",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether this error is a rule violation caused by the request itself.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Self::MissingJustification { .. }
                | Self::UnexpectedJustification
                | Self::RunNotEnded { .. }
                | Self::NotCalibrationRun { .. }
                | Self::DetectorNotFound { .. }
                | Self::InvalidReasonType { .. }
                | Self::ValidationError { .. }
        )
    }

    /// Whether this error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RunNotFound { .. } | Self::EnvironmentNotFound { .. } | Self::LhcFillNotFound { .. }
        )
    }

    /// Whether this error reports a duplicate resource.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::RunAlreadyExists { .. }
                | Self::EnvironmentAlreadyExists { .. }
                | Self::LhcFillAlreadyExists { .. }
        )
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunNotFound { run_number } => {
                write!(f, "Run with this run number ({}) could not be found", run_number)
            }
            Self::RunAlreadyExists { run_number } => {
                write!(f, "A run already exists with run number {}", run_number)
            }
            Self::MissingJustification { field } => match field {
                JustifiedField::RunQuality => f.write_str("Run quality change require a reason"),
                JustifiedField::DetectorsQualities => f.write_str(
                    "Detector quality change reason is required when updating detector quality",
                ),
                JustifiedField::CalibrationStatus => f.write_str(
                    "Calibration status change require a reason when changing from/to FAILED",
                ),
            },
            Self::UnexpectedJustification => f.write_str(
                "Calibration status change reason can only be specified when changing from/to FAILED",
            ),
            Self::RunNotEnded { .. } => {
                f.write_str("Detector quality can not be updated on a run that has not ended yet")
            }
            Self::NotCalibrationRun { .. } => {
                f.write_str("Calibration status is reserved to calibration runs")
            }
            Self::DetectorNotFound {
                run_number,
                detector_id,
            } => {
                write!(
                    f,
                    "This run's detector with runNumber: ({}) and with detector Id: ({}) could not be found",
                    run_number, detector_id
                )
            }
            Self::InvalidReasonType { .. } => f.write_str("Provided reason types do not exist"),
            Self::EnvironmentNotFound { environment_id } => {
                write!(f, "Environment with this id ({}) could not be found", environment_id)
            }
            Self::EnvironmentAlreadyExists { environment_id } => {
                write!(f, "An environment already exists with id {}", environment_id)
            }
            Self::LhcFillNotFound { fill_number } => {
                write!(f, "LhcFill with this number ({}) could not be found", fill_number)
            }
            Self::LhcFillAlreadyExists { fill_number } => {
                write!(f, "An LHC fill already exists with number {}", fill_number)
            }
            Self::ValidationError { field, message } => {
                write!(f, "\"{}\" {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<UnknownVariant> for CoreError {
    fn from(err: UnknownVariant) -> Self {
        CoreError::DatabaseError {
            operation: "decode".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let test_cases = vec![
            (CoreError::RunNotFound { run_number: 1 }, "RUN_NOT_FOUND"),
            (
                CoreError::RunAlreadyExists { run_number: 1 },
                "RUN_ALREADY_EXISTS",
            ),
            (
                CoreError::MissingJustification {
                    field: JustifiedField::RunQuality,
                },
                "MISSING_JUSTIFICATION",
            ),
            (CoreError::UnexpectedJustification, "UNEXPECTED_JUSTIFICATION"),
            (CoreError::RunNotEnded { run_number: 1 }, "RUN_NOT_ENDED"),
            (
                CoreError::NotCalibrationRun { run_number: 1 },
                "NOT_CALIBRATION_RUN",
            ),
            (
                CoreError::DetectorNotFound {
                    run_number: 1,
                    detector_id: 2,
                },
                "DETECTOR_NOT_FOUND",
            ),
            (
                CoreError::InvalidReasonType {
                    reason_type_ids: vec![999],
                },
                "INVALID_REASON_TYPE",
            ),
            (
                CoreError::DatabaseError {
                    operation: "insert".to_string(),
                    details: "connection refused".to_string(),
                },
                "DATABASE_ERROR",
            ),
        ];

        for (error, expected_code) in test_cases {
            assert_eq!(
                error.error_code(),
                expected_code,
                "Error {:?} should have code {}",
                error,
                expected_code
            );
            assert!(!error.to_string().is_empty(), "Message should not be empty");
        }
    }

    #[test]
    fn test_rule_violation_messages() {
        assert_eq!(
            CoreError::MissingJustification {
                field: JustifiedField::RunQuality
            }
            .to_string(),
            "Run quality change require a reason"
        );
        assert_eq!(
            CoreError::MissingJustification {
                field: JustifiedField::DetectorsQualities
            }
            .to_string(),
            "Detector quality change reason is required when updating detector quality"
        );
        assert_eq!(
            CoreError::MissingJustification {
                field: JustifiedField::CalibrationStatus
            }
            .to_string(),
            "Calibration status change require a reason when changing from/to FAILED"
        );
        assert_eq!(
            CoreError::UnexpectedJustification.to_string(),
            "Calibration status change reason can only be specified when changing from/to FAILED"
        );
        assert_eq!(
            CoreError::DetectorNotFound {
                run_number: 1,
                detector_id: 9999
            }
            .to_string(),
            "This run's detector with runNumber: (1) and with detector Id: (9999) could not be found"
        );
        assert_eq!(
            CoreError::RunNotFound { run_number: 42 }.to_string(),
            "Run with this run number (42) could not be found"
        );
    }

    #[test]
    fn test_error_classes() {
        assert!(CoreError::UnexpectedJustification.is_rule_violation());
        assert!(CoreError::RunNotFound { run_number: 1 }.is_not_found());
        assert!(
            CoreError::EnvironmentAlreadyExists {
                environment_id: "env".to_string()
            }
            .is_conflict()
        );
        assert!(
            !CoreError::DatabaseError {
                operation: "query".to_string(),
                details: "x".to_string()
            }
            .is_rule_violation()
        );
    }
}
