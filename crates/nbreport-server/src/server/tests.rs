// nbreport-server/src/server/tests.rs
// ============================================================================
// Module: HTTP Server Unit Tests
// Description: In-process router tests for the report service surface.
// Purpose: Validate routing, content negotiation, and redirect behavior.
// Dependencies: axum, http-body-util, nbreport-core, tempfile, tower
// ============================================================================

//! ## Overview
//! Exercises the router with `tower::ServiceExt::oneshot` against a local
//! template tree and stub shell engines; no listener and no real engines are
//! involved.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions on in-process requests."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header;
use http_body_util::BodyExt;
use nbreport_core::RepositorySynchronizer;
use nbreport_core::archive::BrokenReportArchive;
use nbreport_core::pipeline::ReportPipeline;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use super::AppState;
use super::router;

type TestResult = Result<(), String>;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn shell(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Builds a state over a local template tree with stub shell engines.
///
/// The broken report directory doubles as the notebook root so archived
/// copies resolve to notebook-relative locations.
fn fixture_state(root: &Path, broken: &Path, execute: &str, convert: &str) -> AppState {
    let synchronizer =
        RepositorySynchronizer::new(root.to_path_buf(), PathBuf::from("."), None);
    let pipeline = ReportPipeline::new(
        shell(execute),
        shell(convert),
        Duration::from_secs(30),
        Duration::from_secs(30),
        BrokenReportArchive::new(broken.to_string_lossy().into_owned()),
    );
    AppState {
        synchronizer: Arc::new(synchronizer),
        pipeline: Arc::new(pipeline),
        user_header: None,
        notebook_dir: broken.to_string_lossy().into_owned(),
    }
}

fn write_notebook(root: &Path, name: &str) {
    let notebook = serde_json::json!({
        "cells": [{
            "cell_type": "code",
            "metadata": { "tags": ["parameters"] },
            "source": "fruit = 'apple'  # fruit to report on\n"
        }],
        "nbformat": 4
    });
    fs::write(root.join(name), notebook.to_string()).unwrap();
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

// ============================================================================
// SECTION: Catalog Routes
// ============================================================================

#[tokio::test]
async fn api_templates_returns_the_catalog_as_json() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    write_notebook(root.path(), "daily.ipynb");
    let app = router(fixture_state(root.path(), broken.path(), "true", "true"));

    let response = app
        .oneshot(Request::builder().uri("/api/templates").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let templates = body["templates"].as_array().ok_or("templates not an array")?;
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0]["path"], "daily.ipynb");
    assert_eq!(templates[0]["parameters"][0]["name"], "fruit");
    assert_eq!(templates[0]["parameters"][0]["default"], "'apple'");
    assert_eq!(templates[0]["parameters"][0]["inferred_type_name"], "str");
    assert_eq!(templates[0]["parameters"][0]["help"], "fruit to report on");
    Ok(())
}

#[tokio::test]
async fn index_renders_a_form_per_template() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    write_notebook(root.path(), "daily.ipynb");
    let app = router(fixture_state(root.path(), broken.path(), "true", "true"));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("daily.ipynb"));
    assert!(body.contains("name=\"root[fruit]\""));
    assert!(body.contains("value=\"&#39;apple&#39;\""));
    Ok(())
}

// ============================================================================
// SECTION: Form Redirect
// ============================================================================

#[tokio::test]
async fn form_submission_redirects_with_encoded_parameters() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    let app = router(fixture_state(root.path(), broken.path(), "true", "true"));

    let body = "path=%2Fdaily.ipynb&root%5Bfruit%5D=sour+cherry&root%5Bskipped%5D=";
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).ok_or("no location")?;
    assert_eq!(location.to_str().unwrap(), "/daily.ipynb?fruit=sour+cherry");
    Ok(())
}

#[tokio::test]
async fn form_submission_without_path_is_a_bad_request() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    let app = router(fixture_state(root.path(), broken.path(), "true", "true"));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("root%5Bfruit%5D=cherry"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

// ============================================================================
// SECTION: Report Execution
// ============================================================================

#[tokio::test]
async fn report_request_returns_the_rendered_html() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    write_notebook(root.path(), "daily.ipynb");
    let app = router(fixture_state(
        root.path(),
        broken.path(),
        "cp {input} {output}",
        "printf '<html>report</html>' > {output_dir}/daily.html",
    ));

    let response = app
        .oneshot(
            Request::builder().uri("/daily.ipynb?fruit=cherry").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<html>report</html>");
    Ok(())
}

#[tokio::test]
async fn non_notebook_paths_are_not_found() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    let app = router(fixture_state(root.path(), broken.path(), "true", "true"));

    let response = app
        .oneshot(Request::builder().uri("/styles.css").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn traversal_paths_are_not_found() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    let app = router(fixture_state(root.path(), broken.path(), "true", "true"));

    let response = app
        .oneshot(
            Request::builder().uri("/reports/../../etc/shadow.ipynb").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn missing_template_names_the_resolved_path() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    let app = router(fixture_state(root.path(), broken.path(), "true", "true"));

    let response = app
        .oneshot(Request::builder().uri("/absent.ipynb").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_text(response).await;
    assert!(body.contains("absent.ipynb"), "body did not name the template: {body}");
    Ok(())
}

#[tokio::test]
async fn json_callers_get_the_error_descriptor() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    let app = router(fixture_state(root.path(), broken.path(), "true", "true"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/absent.ipynb")
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status_code"], 404);
    assert_eq!(body["status_text"], "Not Found");
    assert!(body["message"].as_str().unwrap().contains("absent.ipynb"));
    Ok(())
}

#[tokio::test]
async fn failed_execution_reports_the_archived_copy() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    write_notebook(root.path(), "daily.ipynb");
    let app = router(fixture_state(
        root.path(),
        broken.path(),
        "printf partial > {output}; echo kernel died >&2; exit 1",
        "true",
    ));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/daily.ipynb")
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["detail"]["code"], 1);
    assert!(body["detail"]["error"].as_str().unwrap().contains("kernel died"));
    assert!(body["detail"]["broken_report"].as_str().unwrap().contains("_broken_daily.ipynb"));
    Ok(())
}

#[tokio::test]
async fn archived_copy_is_reported_relative_to_the_notebook_root() -> TestResult {
    let root = TempDir::new().unwrap();
    let broken = TempDir::new().unwrap();
    write_notebook(root.path(), "daily.ipynb");
    let app = router(fixture_state(
        root.path(),
        broken.path(),
        "printf partial > {output}; exit 1",
        "true",
    ));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/daily.ipynb")
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let location = body["detail"]["notebook_path"].as_str().ok_or("notebook_path missing")?;
    assert!(location.ends_with("_broken_daily.ipynb"), "unexpected location {location}");
    assert!(!location.contains('/'), "location is not notebook-relative: {location}");
    Ok(())
}
