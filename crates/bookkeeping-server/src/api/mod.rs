// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/api/status` | liveness and database check |
//! | GET, POST | `/api/runs` | list / create runs |
//! | GET | `/api/runs/reasonTypes` | EOR reason types |
//! | GET, PUT, PATCH | `/api/runs/{runNumber}` | get / update qualities / patch timing |
//! | GET | `/api/runs/{runNumber}/logs` | audit entries of a run |
//! | GET, POST | `/api/environments` | list / create environments |
//! | GET, PUT | `/api/environments/{id}` | get / update an environment |
//! | GET, POST | `/api/lhcFills` | list / create fills |
//! | GET, PATCH | `/api/lhcFills/{fillNumber}` | get / update a fill |
//! | GET | `/api/lhcFills/{fillNumber}/runs` | runs of a fill |

pub mod environments;
pub mod error;
pub mod lhc_fills;
pub mod runs;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use bookkeeping_core::commands::Paginated;
use bookkeeping_core::persistence::Persistence;
use bookkeeping_core::services::{EnvironmentService, LhcFillService, RunService};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use self::error::ApiError;

/// Header naming the user behind a request, recorded in audit entries.
pub const ACTOR_HEADER: &str = "x-bookkeeping-user";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub persistence: Arc<dyn Persistence>,
    pub runs: RunService,
    pub environments: EnvironmentService,
    pub lhc_fills: LhcFillService,
}

impl AppState {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            runs: RunService::new(persistence.clone()),
            environments: EnvironmentService::new(persistence.clone()),
            lhc_fills: LhcFillService::new(persistence.clone()),
            persistence,
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/runs", get(runs::list).post(runs::create))
        .route("/api/runs/reasonTypes", get(runs::reason_types))
        .route(
            "/api/runs/{run_number}",
            get(runs::get).put(runs::update).patch(runs::patch),
        )
        .route("/api/runs/{run_number}/logs", get(runs::logs))
        .route(
            "/api/environments",
            get(environments::list).post(environments::create),
        )
        .route(
            "/api/environments/{id}",
            get(environments::get).put(environments::update),
        )
        .route("/api/lhcFills", get(lhc_fills::list).post(lhc_fills::create))
        .route(
            "/api/lhcFills/{fill_number}",
            get(lhc_fills::get).patch(lhc_fills::update),
        )
        .route("/api/lhcFills/{fill_number}/runs", get(lhc_fills::runs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `{ "data": ... }` envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// `{ "data": [...], "meta": { "page": ... } }` envelope.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub meta: ListMeta,
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub page: PageMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page_count: i64,
    pub total_count: i64,
}

impl<T> From<Paginated<T>> for ListResponse<T> {
    fn from(page: Paginated<T>) -> Self {
        Self {
            data: page.items,
            meta: ListMeta {
                page: PageMeta {
                    page_count: page.page_count,
                    total_count: page.total_count,
                },
            },
        }
    }
}

pub(crate) fn data<T: Serialize>(data: T) -> Json<DataResponse<T>> {
    Json(DataResponse { data })
}

pub(crate) fn created<T: Serialize>(data: T) -> (StatusCode, Json<DataResponse<T>>) {
    (StatusCode::CREATED, Json(DataResponse { data }))
}

/// Actor from [`ACTOR_HEADER`], when present and not blank.
pub(crate) fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Parse a numeric path parameter.
pub(crate) fn number_param(name: &str, raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| {
            ApiError::from(vec![bookkeeping_core::dto::ValidationError {
                field: format!("params.{}", name),
                message: "must be a positive integer".to_string(),
            }])
        })
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    match state.persistence.health_check().await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "data": { "status": "ok", "database": true } })),
        ),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "data": { "status": "degraded", "database": false } })),
        ),
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "data": { "status": "degraded", "database": false } })),
            )
        }
    }
}
