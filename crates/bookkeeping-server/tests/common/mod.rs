// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for bookkeeping-server integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bookkeeping_core::persistence::{Persistence, SqlitePersistence};
use bookkeeping_server::api::{ACTOR_HEADER, AppState, router};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

/// In-memory SQLite store with the schema applied.
pub async fn persistence() -> Arc<dyn Persistence> {
    let persistence = SqlitePersistence::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to open in-memory SQLite database");
    Arc::new(persistence)
}

/// Router over a fresh in-memory store.
pub async fn app() -> Router {
    router(AppState::new(persistence().await))
}

/// Send one request through the router and decode the JSON response.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    actor: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        request = request.header(ACTOR_HEADER, actor);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("Failed to build request");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Router failed to respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body), None).await
}

/// First error detail of a failure envelope.
pub fn first_error_detail(body: &Value) -> &str {
    body["errors"][0]["detail"].as_str().unwrap_or_default()
}
