#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::dtos::extract_status::ExtractedFileStatus;
use extraction_core::backends::external_tool::{ExternalToolBackend, ExternalToolRunner};
use extraction_core::backends::router::ModalityRouter;
use extraction_core::backends::AnonymiserBackend;

use crate::helpers::{StubBackend, TestWorkbench};

/// Writes an executable shell script standing in for the anonymiser tool
fn write_tool(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    path
}

#[tokio::test]
async fn a_tool_that_copies_its_input_counts_as_anonymised() {
    let tools = tempfile::tempdir().unwrap();
    let tool = write_tool(&tools, "anon.sh", r#"cp "$1" "$2""#);

    let work = tempfile::tempdir().unwrap();
    let src = work.path().join("in.dcm");
    let dst = work.path().join("out.dcm");
    std::fs::write(&src, b"payload").unwrap();

    let runner = ExternalToolRunner::new(&tool).unwrap();
    let outcome = runner.run(&src, &dst).await;

    assert_eq!(outcome.status, ExtractedFileStatus::Anonymised);
    assert!(outcome.message.is_none());
    assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
}

#[tokio::test]
async fn a_nonzero_exit_code_is_an_error_with_the_tool_stderr() {
    let tools = tempfile::tempdir().unwrap();
    let tool = write_tool(&tools, "anon.sh", "echo boom >&2\nexit 1");

    let work = tempfile::tempdir().unwrap();
    let src = work.path().join("in.dcm");
    std::fs::write(&src, b"payload").unwrap();

    let runner = ExternalToolRunner::new(&tool).unwrap();
    let outcome = runner.run(&src, &work.path().join("out.dcm")).await;

    assert_eq!(outcome.status, ExtractedFileStatus::ErrorWontRetry);
    let message = outcome.message.unwrap();
    assert!(message.contains("exited with code 1"), "{message}");
    assert!(message.contains("boom"), "{message}");
}

#[tokio::test]
async fn a_zero_exit_without_an_output_file_is_an_error() {
    let tools = tempfile::tempdir().unwrap();
    let tool = write_tool(&tools, "anon.sh", "exit 0");

    let work = tempfile::tempdir().unwrap();
    let src = work.path().join("in.dcm");
    let dst = work.path().join("out.dcm");
    std::fs::write(&src, b"payload").unwrap();

    let runner = ExternalToolRunner::new(&tool).unwrap();
    let outcome = runner.run(&src, &dst).await;

    assert_eq!(outcome.status, ExtractedFileStatus::ErrorWontRetry);
    let message = outcome.message.unwrap();
    assert!(
        message.contains("output file was not created"),
        "{message}"
    );
    assert!(message.contains(dst.to_str().unwrap()), "{message}");
}

#[tokio::test]
async fn a_hanging_tool_is_killed_at_the_timeout() {
    let tools = tempfile::tempdir().unwrap();
    let tool = write_tool(&tools, "anon.sh", "sleep 5");

    let work = tempfile::tempdir().unwrap();
    let src = work.path().join("in.dcm");
    std::fs::write(&src, b"payload").unwrap();

    let runner = ExternalToolRunner::with_timeout(&tool, Duration::from_millis(200)).unwrap();
    let outcome = runner.run(&src, &work.path().join("out.dcm")).await;

    assert_eq!(outcome.status, ExtractedFileStatus::ErrorWontRetry);
    assert!(outcome.message.unwrap().contains("timed out after"));
}

#[tokio::test]
async fn an_xa_request_goes_through_the_external_tool_end_to_end() {
    // Arrange: a worker whose primary backend would fail, so only the
    // external tool can produce this outcome
    let workbench = TestWorkbench::new();
    workbench.write_source("foo.dcm", b"payload");

    let tools = tempfile::tempdir().unwrap();
    let tool = write_tool(&tools, "xa-anon.sh", r#"cp "$1" "$2""#);

    let router = ModalityRouter::new(
        Arc::new(StubBackend::failing("primary should not run")),
        Some(Arc::new(ExternalToolBackend::new(&tool).unwrap()) as Arc<dyn AnonymiserBackend>),
    );
    let worker = workbench.anonymise_worker(Arc::new(router), false, false);

    let mut request = workbench.a_request();
    request.modality = "XA".to_string();

    // Act
    worker
        .process(&request, &workbench.acknowledger())
        .await
        .unwrap();

    // Assert
    let (routing_key, status) = workbench.log.the_published_status();
    assert_eq!(routing_key, "verify");
    assert_eq!(status.status, ExtractedFileStatus::Anonymised);
    assert_eq!(
        std::fs::read(workbench.destination("foo-an.dcm")).unwrap(),
        b"payload"
    );
}
