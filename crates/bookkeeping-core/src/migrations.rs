// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for bookkeeping-core.
//!
//! This module exposes embedded migrations that can be run programmatically.
//! [`crate::persistence::connect`] runs them when opening a store; callers
//! managing their own pool can apply them directly.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::PgPool;
//! use bookkeeping_core::migrations;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! migrations::run_postgres(&pool).await?;
//! ```

use sqlx::migrate::MigrateError;

/// PostgreSQL migrator with the bookkeeping schema embedded.
pub static POSTGRES: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgresql");

/// SQLite migrator with the bookkeeping schema embedded.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Run PostgreSQL migrations.
///
/// Already-applied migrations are skipped.
pub async fn run_postgres(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    POSTGRES.run(pool).await
}

/// Run SQLite migrations.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}
