//! Execution pipeline tests for nbreport-core.
// crates/nbreport-core/tests/pipeline_execution.rs
// =============================================================================
// Module: Pipeline Execution Tests
// Description: Validate the two-stage pipeline with stub shell engines.
// Purpose: Ensure success, failure, archival, and timeout behavior.
// =============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions on tempdir fixtures."
)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use nbreport_core::ActingUser;
use nbreport_core::CommandError;
use nbreport_core::ReportError;
use nbreport_core::archive::BrokenReportArchive;
use nbreport_core::pipeline::ExecutionRequest;
use nbreport_core::pipeline::ReportPipeline;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn shell(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn pipeline(execute: &str, convert: &str, timeout: Duration, broken_dir: &Path) -> ReportPipeline {
    ReportPipeline::new(
        shell(execute),
        shell(convert),
        timeout,
        timeout,
        BrokenReportArchive::new(broken_dir.to_string_lossy().into_owned()),
    )
}

fn request(template: &Path, parameters: &[(&str, &str)]) -> ExecutionRequest {
    ExecutionRequest {
        template_path: template.to_path_buf(),
        raw_parameters: parameters
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect(),
        user: ActingUser::Anonymous,
    }
}

fn write_template(dir: &Path) -> Result<std::path::PathBuf, String> {
    let template = dir.join("report.ipynb");
    fs::write(&template, "{\"cells\": []}").map_err(|err| err.to_string())?;
    Ok(template)
}

#[tokio::test]
async fn successful_run_returns_converted_html() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let broken = TempDir::new().map_err(|err| err.to_string())?;
    let template = write_template(dir.path())?;
    let pipeline = pipeline(
        "cp {input} {output}",
        "printf '<html>done</html>' > {output_dir}/report.html",
        Duration::from_secs(30),
        broken.path(),
    );

    let report =
        pipeline.execute(&request(&template, &[])).await.map_err(|err| err.to_string())?;
    assert_eq!(report.html, "<html>done</html>");
    Ok(())
}

#[tokio::test]
async fn parameters_file_reaches_the_execution_engine() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let broken = TempDir::new().map_err(|err| err.to_string())?;
    let template = write_template(dir.path())?;
    // The stub copies the parameters file into the rendered output so the
    // assertion can see what the engine was handed.
    let pipeline = pipeline(
        "cp {parameters} {output}",
        "cp {input} {output_dir}/report.html",
        Duration::from_secs(30),
        broken.path(),
    );

    let report = pipeline
        .execute(&request(&template, &[("count", "4"), ("fruit", "cherry ")]))
        .await
        .map_err(|err| err.to_string())?;
    let parameters: serde_json::Value =
        serde_json::from_str(&report.html).map_err(|err| err.to_string())?;
    assert_eq!(parameters["count"], serde_json::json!(4));
    assert_eq!(parameters["fruit"], serde_json::json!("cherry "));
    Ok(())
}

#[tokio::test]
async fn missing_template_is_reported_before_execution() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let broken = TempDir::new().map_err(|err| err.to_string())?;
    let missing = dir.path().join("absent.ipynb");
    let pipeline =
        pipeline("true", "true", Duration::from_secs(30), broken.path());

    let error = pipeline
        .execute(&request(&missing, &[]))
        .await
        .err()
        .ok_or("expected missing template error")?;
    match &error {
        ReportError::TemplateNotFound(path) => assert_eq!(path, &missing),
        other => return Err(format!("unexpected error: {other}")),
    }
    assert_eq!(error.status_code(), 404);
    assert!(error.to_string().contains("absent.ipynb"));
    Ok(())
}

#[tokio::test]
async fn failed_execution_archives_the_partial_document() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let broken = TempDir::new().map_err(|err| err.to_string())?;
    let template = write_template(dir.path())?;
    let pipeline = pipeline(
        "printf partial > {output}; echo kernel died >&2; exit 3",
        "true",
        Duration::from_secs(30),
        broken.path(),
    );

    let error = pipeline
        .execute(&request(&template, &[]))
        .await
        .err()
        .ok_or("expected execution failure")?;
    let ReportError::Execution {
        source,
        archived,
    } = &error
    else {
        return Err(format!("unexpected error: {error}"));
    };
    let CommandError::Failed {
        code,
        stderr,
        ..
    } = source
    else {
        return Err(format!("unexpected command error: {source}"));
    };
    assert_eq!(*code, Some(3));
    assert!(stderr.contains("kernel died"));

    let archived = archived.as_ref().ok_or("expected archived partial document")?;
    let name = archived.file_name().ok_or("archived path has no name")?.to_string_lossy();
    assert!(name.contains("_broken_report.ipynb"), "unexpected archive name {name}");
    let contents = fs::read_to_string(archived).map_err(|err| err.to_string())?;
    assert_eq!(contents, "partial");
    Ok(())
}

#[tokio::test]
async fn failed_execution_without_output_archives_nothing() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let broken = TempDir::new().map_err(|err| err.to_string())?;
    let template = write_template(dir.path())?;
    let pipeline =
        pipeline("exit 1", "true", Duration::from_secs(30), broken.path());

    let error = pipeline
        .execute(&request(&template, &[]))
        .await
        .err()
        .ok_or("expected execution failure")?;
    assert!(error.archived().is_none());
    Ok(())
}

#[tokio::test]
async fn failed_conversion_archives_the_executed_document() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let broken = TempDir::new().map_err(|err| err.to_string())?;
    let template = write_template(dir.path())?;
    let pipeline = pipeline(
        "cp {input} {output}",
        "echo no converter >&2; exit 2",
        Duration::from_secs(30),
        broken.path(),
    );

    let error = pipeline
        .execute(&request(&template, &[]))
        .await
        .err()
        .ok_or("expected conversion failure")?;
    let ReportError::Conversion {
        archived, ..
    } = &error
    else {
        return Err(format!("unexpected error: {error}"));
    };
    assert!(archived.is_some());
    assert_eq!(error.status_code(), 500);
    Ok(())
}

#[tokio::test]
async fn slow_execution_times_out() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let broken = TempDir::new().map_err(|err| err.to_string())?;
    let template = write_template(dir.path())?;
    let pipeline =
        pipeline("sleep 30", "true", Duration::from_millis(200), broken.path());

    let error = pipeline
        .execute(&request(&template, &[]))
        .await
        .err()
        .ok_or("expected timeout")?;
    let ReportError::Execution {
        source, ..
    } = &error
    else {
        return Err(format!("unexpected error: {error}"));
    };
    assert!(matches!(source, CommandError::TimedOut { .. }));
    Ok(())
}

#[tokio::test]
async fn error_descriptor_carries_process_detail() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let broken = TempDir::new().map_err(|err| err.to_string())?;
    let template = write_template(dir.path())?;
    let pipeline = pipeline(
        "printf partial > {output}; exit 7",
        "true",
        Duration::from_secs(30),
        broken.path(),
    );

    let error = pipeline
        .execute(&request(&template, &[]))
        .await
        .err()
        .ok_or("expected execution failure")?;
    let descriptor = error.describe();
    assert_eq!(descriptor.status_code, 500);
    assert_eq!(descriptor.status_text, "Internal Server Error");
    assert_eq!(descriptor.detail["code"], serde_json::json!(7));
    assert!(descriptor.detail["command"].as_str().ok_or("command missing")?.contains("sh -c"));
    assert!(descriptor.detail["broken_report"].is_string());
    Ok(())
}
