// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment handlers.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use bookkeeping_core::dto::{CreateEnvironmentRequest, PageQuery, UpdateEnvironmentRequest};

use super::{ApiError, AppState, ListResponse, created, data};

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let page = query.validate()?;
    let environments = state.environments.list(&page).await?;
    Ok(Json(ListResponse::from(environments)))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateEnvironmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let environment = request.validate()?;
    let environment = state.environments.create(&environment).await?;
    Ok(created(environment))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let environment = state.environments.get(&id).await?;
    Ok(data(environment))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateEnvironmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let update = request.validate()?;
    let environment = state.environments.update(&id, &update).await?;
    Ok(data(environment))
}
