// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bookkeeping Server - HTTP API and housekeeping for run bookkeeping
//!
//! This crate exposes the run bookkeeping domain of [`bookkeeping_core`]
//! over HTTP and runs the housekeeping worker that closes runs and
//! environments the experiment control system no longer reports.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `BOOKKEEPING_DATABASE_URL` | Yes | - | `postgres://` or `sqlite:` URL (fallback `DATABASE_URL`) |
//! | `BOOKKEEPING_HTTP_PORT` | No | `4000` | HTTP listen port |
//! | `BOOKKEEPING_HOUSEKEEPING_ENABLED` | No | `false` | Start the lost runs/environments monitor |
//! | `BOOKKEEPING_CONTROL_URL` | With housekeeping | - | Control-system environments endpoint |
//! | `BOOKKEEPING_HOUSEKEEPING_INTERVAL_SECS` | No | `30` | Monitor period |
//! | `BOOKKEEPING_LOST_THRESHOLD_SECS` | No | `900` | Age after which unreported items are lost |
//! | `BOOKKEEPING_CONTROL_TIMEOUT_SECS` | No | `10` | Control-system request timeout |
//!
//! # Modules
//!
//! - [`api`]: axum router and handlers
//! - [`config`]: Server configuration from environment variables
//! - [`control_client`]: Control-system HTTP client
//! - [`housekeeping`]: Lost runs and environments monitor
//! - [`runtime`]: Task ownership, start and graceful shutdown
//! - [`error`]: Server error types

/// axum router and handlers.
pub mod api;

/// Server configuration loaded from environment variables.
pub mod config;

/// Control-system HTTP client.
pub mod control_client;

/// Error types for the server.
pub mod error;

/// Lost runs and environments monitor.
pub mod housekeeping;

/// Embeddable runtime.
pub mod runtime;
