// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bookkeeping Core - Run bookkeeping domain
//!
//! This crate holds the domain of the run bookkeeping service: the run
//! definition classifier, the rules governing run quality, detector quality,
//! calibration status and end-of-run reason updates, the reconciliation of
//! runs and environments the control system lost track of, and the
//! persistence layer behind all of them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │      HTTP API (server)       │      │  Reconciliation monitor      │
//! └──────────────┬───────────────┘      └──────────────┬───────────────┘
//!                │ dto::validate                       │ snapshot
//!                ▼                                     ▼
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │  services (runs, envs,       │      │  reconciliation              │
//! │  fills) + lifecycle rules    │      │  (lost runs / environments)  │
//! └──────────────┬───────────────┘      └──────────────┬───────────────┘
//!                │                                     │
//!                ▼                                     ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │        Persistence trait (PostgreSQL / SQLite backends)              │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Run definition
//!
//! | Definition | Condition |
//! |------------|-----------|
//! | `PHYSICS` | full data-taking chain, ITS or FT0 present, fill reached stable beams |
//! | `COSMICS` | full data-taking chain otherwise |
//! | `TECHNICAL` | technical run type and PDP beam type |
//! | `SYNTHETIC` | replayed data without DCS or trigger |
//!
//! The definition is recomputed on every read and never stored.
//!
//! # Update rules
//!
//! | Field | Rule |
//! |-------|------|
//! | `runQuality` | any change needs a reason |
//! | `detectorsQualities` | run must have ended, detector must belong to the run, changes need a reason |
//! | `calibrationStatus` | calibration runs only, reason needed iff `FAILED` is involved |
//! | `eorReasons` | appended, reason type must exist |
//!
//! Every accepted change writes an audit log entry in the same transaction.
//!
//! # Modules
//!
//! - [`model`]: Entities and enumerations exposed by the API
//! - [`definition`]: Run definition classifier
//! - [`lifecycle`]: Run update rules and audit entries
//! - [`dto`]: Request payloads and their validation
//! - [`commands`]: Validated commands
//! - [`services`]: Run, environment and LHC fill use cases
//! - [`reconciliation`]: Lost runs and environments
//! - [`persistence`]: Storage trait and backends
//! - [`error`]: Error types with API error codes

/// Validated commands accepted by the services.
pub mod commands;

/// Run definition classifier.
pub mod definition;

/// Request payloads and their validation.
pub mod dto;

/// Error types with API error codes.
pub mod error;

/// Run update rules.
pub mod lifecycle;

/// Embedded database migrations.
pub mod migrations;

/// Entities and enumerations.
pub mod model;

/// Storage trait and backends.
pub mod persistence;

/// Lost runs and environments reconciliation.
pub mod reconciliation;

/// Run, environment and LHC fill use cases.
pub mod services;

pub use error::{CoreError, Result};
pub use persistence::Persistence;
pub use services::{EnvironmentService, LhcFillService, RunService};
