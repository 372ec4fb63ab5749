// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run handlers.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use bookkeeping_core::dto::{CreateRunRequest, PatchRunRequest, RunListQuery, UpdateRunRequest};

use super::{ApiError, AppState, ListResponse, actor, created, data, number_param};

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<RunListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let filter = query.validate()?;
    let page = state.runs.list(&filter).await?;
    Ok(Json(ListResponse::from(page)))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let new_run = request.validate()?;
    let run = state.runs.create(&new_run).await?;
    Ok(created(run))
}

pub async fn get(
    State(state): State<AppState>,
    Path(run_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run_number = number_param("runNumber", &run_number)?;
    let run = state.runs.get(run_number).await?;
    Ok(data(run))
}

/// Quality, detector quality, calibration status and EOR reason update.
pub async fn update(
    State(state): State<AppState>,
    Path(run_number): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdateRunRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let run_number = number_param("runNumber", &run_number)?;
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let update = request.validate(actor(&headers))?;
    let run = state.runs.update(run_number, &update).await?;
    Ok(data(run))
}

pub async fn patch(
    State(state): State<AppState>,
    Path(run_number): Path<String>,
    payload: Result<Json<PatchRunRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let run_number = number_param("runNumber", &run_number)?;
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let patch = request.validate()?;
    let run = state.runs.patch_timing(run_number, &patch).await?;
    Ok(data(run))
}

pub async fn reason_types(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let reason_types = state.runs.reason_types().await?;
    Ok(data(reason_types))
}

pub async fn logs(
    State(state): State<AppState>,
    Path(run_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run_number = number_param("runNumber", &run_number)?;
    let logs = state.runs.logs(run_number).await?;
    Ok(data(logs))
}
