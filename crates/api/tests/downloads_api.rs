//! Integration tests for the download job lifecycle.

mod common;

use std::io::Read;
use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::Router;
use common::{body_bytes, body_json, get, post_json};
use serde_json::{json, Value};

/// Poll the job until it leaves the queued/in-progress states.
async fn wait_for_terminal_status(app: &Router, job_id: &str) -> Value {
    let uri = format!("/api/v1/downloads/{job_id}");
    for _ in 0..200 {
        let json = body_json(get(app.clone(), &uri).await).await;
        let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
        if status == "ready" || status == "error" {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("download job {job_id} did not finish");
}

// ---------------------------------------------------------------------------
// Test: a directory download is zipped and can be fetched exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn directory_download_produces_zip_once() {
    let test = common::build_test_app().await;
    test.write_remote("worlds/overworld/level.dat", &[1u8; 64]);
    test.write_remote("worlds/overworld/region/a.mca", &[2u8; 64]);
    test.write_remote("worlds/overworld/region/b.mca", &[3u8; 64]);

    let response = post_json(
        test.app.clone(),
        "/api/v1/downloads",
        json!({ "path": "/worlds/overworld", "requestId": "job-1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["jobId"], "job-1");
    assert_eq!(json["data"]["remotePath"], "/worlds/overworld");

    let job = wait_for_terminal_status(&test.app, "job-1").await;
    assert_eq!(job["status"], "ready", "job failed: {job}");
    assert_eq!(job["fileName"], "overworld.zip");

    let response = get(test.app.clone(), "/api/v1/downloads/job-1/file").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"overworld.zip\""
    );

    let bytes = body_bytes(response).await;
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut names = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).unwrap();
        if entry.is_file() {
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            assert_eq!(content.len(), 64);
            names.push(entry.name().to_string());
        }
    }
    names.sort();
    assert_eq!(
        names,
        vec![
            "overworld/level.dat",
            "overworld/region/a.mca",
            "overworld/region/b.mca"
        ]
    );

    // The artifact is consumed by the first fetch.
    let response = get(test.app.clone(), "/api/v1/downloads/job-1/file").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = get(test.app.clone(), "/api/v1/downloads/job-1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: a single file download keeps its name
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_download_streams_original_bytes() {
    let test = common::build_test_app().await;
    test.write_remote("logs/latest.log", b"[server] started\n");

    let json = body_json(
        post_json(
            test.app.clone(),
            "/api/v1/downloads",
            json!({ "path": "/logs/latest.log" }),
        )
        .await,
    )
    .await;
    let job_id = json["data"]["jobId"].as_str().unwrap().to_string();

    let job = wait_for_terminal_status(&test.app, &job_id).await;
    assert_eq!(job["status"], "ready", "job failed: {job}");
    assert_eq!(job["fileName"], "latest.log");

    let response = get(test.app.clone(), &format!("/api/v1/downloads/{job_id}/file")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(body_bytes(response).await, b"[server] started\n");
}

// ---------------------------------------------------------------------------
// Test: a missing path ends in the error state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_path_fails_job() {
    let test = common::build_test_app().await;

    post_json(
        test.app.clone(),
        "/api/v1/downloads",
        json!({ "path": "/nowhere", "requestId": "job-missing" }),
    )
    .await;

    let job = wait_for_terminal_status(&test.app, "job-missing").await;
    assert_eq!(job["status"], "error");
    assert!(job["error"].is_string());

    let response = get(test.app.clone(), "/api/v1/downloads/job-missing/file").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Test: malformed request ids are rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_request_id_is_rejected() {
    let test = common::build_test_app().await;

    let response = post_json(
        test.app.clone(),
        "/api/v1/downloads",
        json!({ "path": "/", "requestId": "../etc" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Test: unknown jobs answer 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_returns_404() {
    let test = common::build_test_app().await;

    let response = get(test.app.clone(), "/api/v1/downloads/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(test.app.clone(), "/api/v1/downloads/nope/file").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: new downloads are refused during maintenance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn downloads_refused_in_maintenance() {
    let test = common::build_test_app().await;
    test.state.maintenance.begin(Some("restart"));

    let response = post_json(
        test.app.clone(),
        "/api/v1/downloads",
        json!({ "path": "/" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
