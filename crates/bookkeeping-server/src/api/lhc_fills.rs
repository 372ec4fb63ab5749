// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LHC fill handlers.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use bookkeeping_core::dto::{CreateLhcFillRequest, PageQuery, UpdateLhcFillRequest};

use super::{ApiError, AppState, ListResponse, created, data, number_param};

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let page = query.validate()?;
    let fills = state.lhc_fills.list(&page).await?;
    Ok(Json(ListResponse::from(fills)))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateLhcFillRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let fill = request.validate()?;
    let fill = state.lhc_fills.create(&fill).await?;
    Ok(created(fill))
}

pub async fn get(
    State(state): State<AppState>,
    Path(fill_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let fill_number = number_param("fillNumber", &fill_number)?;
    let fill = state.lhc_fills.get(fill_number).await?;
    Ok(data(fill))
}

pub async fn update(
    State(state): State<AppState>,
    Path(fill_number): Path<String>,
    payload: Result<Json<UpdateLhcFillRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let fill_number = number_param("fillNumber", &fill_number)?;
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let update = request.validate()?;
    let fill = state.lhc_fills.update(fill_number, &update).await?;
    Ok(data(fill))
}

/// Runs of a fill. Empty until the fill reached stable beams.
pub async fn runs(
    State(state): State<AppState>,
    Path(fill_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let fill_number = number_param("fillNumber", &fill_number)?;
    let runs = state.lhc_fills.runs(fill_number).await?;
    Ok(data(runs))
}
