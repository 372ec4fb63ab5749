// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP error mapping for API handlers.
//!
//! Every failure is rendered as `{ "errors": [{ "status", "title", "detail" }] }`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bookkeeping_core::dto::ValidationErrors;
use bookkeeping_core::error::CoreError;
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    /// Request payload, query or path failed validation.
    Validation(ValidationErrors),
    /// Malformed request (unparsable JSON, wrong types).
    BadRequest(String),
    /// Domain or storage failure.
    Core(CoreError),
}

#[derive(Debug, Serialize)]
struct ErrorObject {
    status: String,
    title: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    errors: Vec<ErrorObject>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(e) if e.is_rule_violation() => StatusCode::BAD_REQUEST,
            Self::Core(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Core(e) if e.is_conflict() => StatusCode::CONFLICT,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self::Core(error)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

fn title(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "Bad Request",
        StatusCode::NOT_FOUND => "Not found",
        StatusCode::CONFLICT => "Conflict",
        _ => "Service unavailable",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let errors = match self {
            Self::Validation(errors) => errors
                .into_iter()
                .map(|e| ErrorObject {
                    status: status.as_u16().to_string(),
                    title: "Invalid Attribute",
                    detail: e.to_string(),
                    code: None,
                })
                .collect(),
            Self::BadRequest(detail) => vec![ErrorObject {
                status: status.as_u16().to_string(),
                title: title(status),
                detail,
                code: None,
            }],
            Self::Core(e) => {
                let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, code = e.error_code(), "Request failed");
                    "An unexpected error occurred".to_string()
                } else {
                    e.to_string()
                };
                vec![ErrorObject {
                    status: status.as_u16().to_string(),
                    title: title(status),
                    detail,
                    code: Some(e.error_code()),
                }]
            }
        };
        (status, Json(ErrorEnvelope { errors })).into_response()
    }
}
