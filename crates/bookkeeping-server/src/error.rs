// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for bookkeeping-server.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Core operation failed.
    #[error("Core error: {0}")]
    Core(#[from] bookkeeping_core::error::CoreError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request to the control system failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The control system answered, but not with a usable response.
    #[error("External system unavailable: {0}")]
    ExternalSystemUnavailable(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using the server Error.
pub type Result<T> = std::result::Result<T, Error>;
