// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API tests driving the router in-process.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{app, first_error_detail, get, post, send};

fn physics_run(run_number: i64, fill_number: Option<i64>) -> serde_json::Value {
    json!({
        "runNumber": run_number,
        "fillNumber": fill_number,
        "timeO2Start": "2024-05-01T10:00:00Z",
        "detectors": "ITS, TPC",
        "triggerValue": "CTP",
        "dcs": true,
        "dd_flp": true,
        "epn": true,
        "tfbDdMode": "processing",
        "pdpWorkflowParameters": "QC,CTF",
        "runType": "PHYSICS"
    })
}

#[tokio::test]
async fn test_status() {
    let app = app().await;
    let (status, body) = get(&app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], true);
}

#[tokio::test]
async fn test_create_and_get_run_with_definition() {
    let app = app().await;
    let (status, _) = post(
        &app,
        "/api/lhcFills",
        json!({ "fillNumber": 1, "stableBeamsStart": "2024-05-01T09:00:00Z" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post(&app, "/api/runs", physics_run(100, Some(1))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["runNumber"], 100);
    assert_eq!(body["data"]["definition"], "PHYSICS");
    assert_eq!(body["data"]["runQuality"], "good");
    assert_eq!(body["data"]["detectorsQualities"].as_array().unwrap().len(), 2);

    let (status, body) = post(&app, "/api/runs", physics_run(101, None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["definition"], "COSMICS");

    let (status, body) = get(&app, "/api/runs/100").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["lhcFill"]["fillNumber"], 1);
}

#[tokio::test]
async fn test_duplicate_run_conflicts() {
    let app = app().await;
    post(&app, "/api/runs", physics_run(1, None)).await;
    let (status, body) = post(&app, "/api/runs", physics_run(1, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(first_error_detail(&body), "A run already exists with run number 1");
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let app = app().await;
    let (status, body) = get(&app, "/api/runs/404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        first_error_detail(&body),
        "Run with this run number (404) could not be found"
    );
}

#[tokio::test]
async fn test_invalid_run_number_param() {
    let app = app().await;
    let (status, body) = get(&app, "/api/runs/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        first_error_detail(&body),
        "\"params.runNumber\" must be a positive integer"
    );
}

#[tokio::test]
async fn test_update_with_invalid_enum_is_rejected() {
    let app = app().await;
    post(&app, "/api/runs", physics_run(1, None)).await;
    let (status, body) = send(
        &app,
        "PUT",
        "/api/runs/1",
        Some(json!({ "runQuality": "excellent" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        first_error_detail(&body),
        "\"body.runQuality\" must be one of [good, bad, test, none]"
    );
}

#[tokio::test]
async fn test_quality_change_requires_reason() {
    let app = app().await;
    post(&app, "/api/runs", physics_run(1, None)).await;

    let (status, body) = send(
        &app,
        "PUT",
        "/api/runs/1",
        Some(json!({ "runQuality": "bad" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(first_error_detail(&body), "Run quality change require a reason");
    assert_eq!(body["errors"][0]["code"], "MISSING_JUSTIFICATION");

    let (status, body) = send(
        &app,
        "PUT",
        "/api/runs/1",
        Some(json!({ "runQuality": "bad", "runQualityChangeReason": "beam loss" })),
        Some("shifter"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["runQuality"], "bad");

    let (status, body) = get(&app, "/api/runs/1/logs").await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["author"], "shifter");
    assert_eq!(logs[0]["title"], "Run 1 quality has changed to bad");
}

#[tokio::test]
async fn test_calibration_status_on_non_calibration_run() {
    let app = app().await;
    post(&app, "/api/runs", physics_run(1, None)).await;
    let (status, body) = send(
        &app,
        "PUT",
        "/api/runs/1",
        Some(json!({ "calibrationStatus": "SUCCESS" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        first_error_detail(&body),
        "Calibration status is reserved to calibration runs"
    );
}

#[tokio::test]
async fn test_detector_quality_after_run_end() {
    let app = app().await;
    let (_, body) = post(&app, "/api/runs", physics_run(1, None)).await;
    let detector_id = body["data"]["detectorsQualities"][0]["id"].clone();
    let update = json!({
        "detectorsQualities": [{ "detectorId": detector_id, "quality": "bad" }],
        "detectorsQualitiesChangeReason": "noisy"
    });

    let (status, _) = send(&app, "PUT", "/api/runs/1", Some(update.clone()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PATCH",
        "/api/runs/1",
        Some(json!({ "timeO2End": "2024-05-01T11:00:00Z" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["runDuration"], 3_600_000);

    let (status, body) = send(&app, "PUT", "/api/runs/1", Some(update), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["detectorsQualities"][0]["quality"], "bad");
}

#[tokio::test]
async fn test_list_runs_with_pagination_meta() {
    let app = app().await;
    for run_number in 1..=3 {
        post(&app, "/api/runs", physics_run(run_number, None)).await;
    }
    let (status, body) = get(&app, "/api/runs?definitions=COSMICS&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["runNumber"], 3);
    assert_eq!(body["meta"]["page"]["totalCount"], 3);
    assert_eq!(body["meta"]["page"]["pageCount"], 2);

    let (status, body) = get(&app, "/api/runs?definitions=PHYSICS").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["page"]["totalCount"], 0);
}

#[tokio::test]
async fn test_reason_types_and_eor_reasons() {
    let app = app().await;
    post(&app, "/api/runs", physics_run(1, None)).await;

    let (status, body) = get(&app, "/api/runs/reasonTypes").await;
    assert_eq!(status, StatusCode::OK);
    let reason_type_id = body["data"][0]["id"].clone();

    let (status, body) = send(
        &app,
        "PUT",
        "/api/runs/1",
        Some(json!({ "eorReasons": [{ "reasonTypeId": reason_type_id, "description": "trip" }] })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["eorReasons"][0]["description"], "trip");

    let (status, _) = send(
        &app,
        "PUT",
        "/api/runs/1",
        Some(json!({ "eorReasons": [{ "reasonTypeId": 9999 }] })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_environment_lifecycle() {
    let app = app().await;
    let (status, body) = post(&app, "/api/environments", json!({ "id": "ENV1" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "STANDBY");

    let (status, _) = post(&app, "/api/environments", json!({ "id": "ENV1" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/environments/ENV1",
        Some(json!({ "status": "RUNNING" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["history"].as_array().unwrap().len(), 2);

    let (status, body) = get(&app, "/api/environments").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["page"]["totalCount"], 1);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/environments/MISSING",
        Some(json!({ "status": "RUNNING" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        first_error_detail(&body),
        "Environment with this id (MISSING) could not be found"
    );
}

#[tokio::test]
async fn test_fill_runs_need_stable_beams() {
    let app = app().await;
    post(&app, "/api/lhcFills", json!({ "fillNumber": 5 })).await;
    post(&app, "/api/runs", physics_run(1, Some(5))).await;

    let (status, body) = get(&app, "/api/lhcFills/5/runs").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = send(
        &app,
        "PATCH",
        "/api/lhcFills/5",
        Some(json!({ "stableBeamsStart": "2024-05-01T09:00:00Z" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fillNumber"], 5);

    let (_, body) = get(&app, "/api/lhcFills/5/runs").await;
    let runs = body["data"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["definition"], "PHYSICS");

    let (status, _) = get(&app, "/api/lhcFills/6").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/runs",
        Some(json!({ "runNumber": "not a number" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].is_array());
}
