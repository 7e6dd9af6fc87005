use common::dtos::extract_status::ExtractedFileStatus;

use crate::helpers::TestWorkbench;

#[tokio::test]
async fn a_file_is_copied_bit_identically_and_reported_on_the_no_verify_key() {
    // Arrange
    let workbench = TestWorkbench::new();
    let source = workbench.write_source("foo.dcm", b"source dicom bytes");
    let modified_before = std::fs::metadata(&source).unwrap().modified().unwrap();

    let worker = workbench.copy_worker(false);

    // Act
    worker
        .process(&workbench.a_request(), &workbench.acknowledger())
        .await
        .unwrap();

    // Assert
    let (routing_key, status) = workbench.log.the_published_status();
    assert_eq!(routing_key, "noverify");
    assert_eq!(status.status, ExtractedFileStatus::Copied);
    assert_eq!(status.output_file_path.as_deref(), Some("foo-an.dcm"));
    assert_eq!(workbench.log.ack_count(), 1);
    assert_eq!(workbench.log.nack_count(), 0);

    assert_eq!(
        std::fs::read(workbench.destination("foo-an.dcm")).unwrap(),
        b"source dicom bytes"
    );
    assert_eq!(
        std::fs::metadata(&source).unwrap().modified().unwrap(),
        modified_before
    );
}

#[tokio::test]
async fn a_missing_source_file_is_reported_on_the_no_verify_key() {
    let workbench = TestWorkbench::new();

    let worker = workbench.copy_worker(false);

    worker
        .process(&workbench.a_request(), &workbench.acknowledger())
        .await
        .unwrap();

    let (routing_key, status) = workbench.log.the_published_status();
    assert_eq!(routing_key, "noverify");
    assert_eq!(status.status, ExtractedFileStatus::FileMissing);
    assert_eq!(
        status.status_message.as_deref(),
        Some(
            format!(
                "Could not find '{}'",
                workbench.source_path("foo.dcm").display()
            )
            .as_str()
        )
    );
    assert!(status.output_file_path.is_none());
    assert_eq!(workbench.log.ack_count(), 1);
}

#[tokio::test]
async fn a_missing_extraction_directory_is_created_rather_than_failed() {
    let workbench = TestWorkbench::new();
    workbench.write_source("foo.dcm", b"source dicom bytes");

    let worker = workbench.copy_worker(false);

    let mut request = workbench.a_request();
    request.extraction_directory = "brandNewDir".to_string();

    worker
        .process(&request, &workbench.acknowledger())
        .await
        .unwrap();

    let (_, status) = workbench.log.the_published_status();
    assert_eq!(status.status, ExtractedFileStatus::Copied);
    assert_eq!(
        std::fs::read(
            workbench
                .extraction_root
                .path()
                .join("brandNewDir")
                .join("foo-an.dcm")
        )
        .unwrap(),
        b"source dicom bytes"
    );
}

#[tokio::test]
async fn an_existing_destination_is_overwritten() {
    let workbench = TestWorkbench::new();
    workbench.write_source("foo.dcm", b"source dicom bytes");
    std::fs::write(workbench.destination("foo-an.dcm"), b"stale").unwrap();

    let worker = workbench.copy_worker(false);

    worker
        .process(&workbench.a_request(), &workbench.acknowledger())
        .await
        .unwrap();

    let (_, status) = workbench.log.the_published_status();
    assert_eq!(status.status, ExtractedFileStatus::Copied);
    assert_eq!(
        std::fs::read(workbench.destination("foo-an.dcm")).unwrap(),
        b"source dicom bytes"
    );
}

#[tokio::test]
async fn identifiable_extraction_requests_are_copied_like_any_other() {
    let workbench = TestWorkbench::new();
    workbench.write_source("foo.dcm", b"source dicom bytes");

    let worker = workbench.copy_worker(false);

    let mut request = workbench.a_request();
    request.is_identifiable_extraction = true;

    worker
        .process(&request, &workbench.acknowledger())
        .await
        .unwrap();

    let (_, status) = workbench.log.the_published_status();
    assert_eq!(status.status, ExtractedFileStatus::Copied);
    assert_eq!(workbench.log.ack_count(), 1);
}
