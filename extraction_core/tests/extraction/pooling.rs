use std::sync::Arc;

use common::dtos::extract_status::ExtractedFileStatus;
use extraction_core::filesystem::LocalFilesystem;
use extraction_core::pool::PoolManager;

use crate::helpers::{StubBackend, TestWorkbench};

const FOUR_BYTES_DIGEST: &str = "9f64a747e1b97f131fabb6b447296c9b6f0201e79fb3c5356e6c77e89b6a806a";
const SOURCE_BYTES_DIGEST: &str =
    "6eb42f2fe098d0424444555c55fbefca76e0f217c083fa42583357d4ef4d4064";

#[tokio::test]
async fn a_first_pooled_anonymisation_creates_a_pool_entry_and_links_to_it() {
    // Arrange
    let workbench = TestWorkbench::new();
    workbench.write_source("foo.dcm", b"source dicom bytes");

    let worker = workbench.anonymise_worker(Arc::new(StubBackend::writing(&[1, 2, 3, 4])), true, false);

    // Act
    worker
        .process(&workbench.a_request(), &workbench.acknowledger())
        .await
        .unwrap();

    // Assert
    let destination = workbench.destination("foo-an.dcm");
    let metadata = std::fs::symlink_metadata(&destination).unwrap();
    assert!(metadata.file_type().is_symlink());

    let target = std::fs::read_link(&destination).unwrap();
    assert_eq!(target, workbench.pool_root.path().join(FOUR_BYTES_DIGEST));
    assert_eq!(std::fs::read(&target).unwrap(), [1, 2, 3, 4]);

    assert_eq!(workbench.pool_files(), vec![target]);

    let (_, status) = workbench.log.the_published_status();
    assert_eq!(status.status, ExtractedFileStatus::Anonymised);
    assert_eq!(status.output_file_path.as_deref(), Some("foo-an.dcm"));
}

#[tokio::test]
async fn byte_identical_outputs_share_a_single_pool_entry() {
    let workbench = TestWorkbench::new();
    workbench.write_source("foo.dcm", b"source dicom bytes");
    workbench.write_source("bar.dcm", b"other source bytes");

    // Both requests materialise the same output bytes
    let worker =
        workbench.anonymise_worker(Arc::new(StubBackend::writing(b"identical output bytes")), true, false);

    let first = workbench.a_request();
    worker
        .process(&first, &workbench.acknowledger())
        .await
        .unwrap();
    let pool_files_after_first = workbench.pool_files();

    let mut second = workbench.a_request();
    second.dicom_file_path = "bar.dcm".to_string();
    second.output_path = "bar-an.dcm".to_string();
    worker
        .process(&second, &workbench.acknowledger())
        .await
        .unwrap();

    assert_eq!(workbench.pool_files(), pool_files_after_first);
    assert_eq!(workbench.pool_files().len(), 1);

    let first_target = std::fs::read_link(workbench.destination("foo-an.dcm")).unwrap();
    let second_target = std::fs::read_link(workbench.destination("bar-an.dcm")).unwrap();
    assert_eq!(first_target, second_target);

    assert_eq!(workbench.log.ack_count(), 2);
}

#[tokio::test]
async fn a_pooled_copy_preserves_the_source_and_links_to_its_digest() {
    let workbench = TestWorkbench::new();
    let source = workbench.write_source("foo.dcm", b"source dicom bytes");

    let worker = workbench.copy_worker(true);

    let mut request = workbench.a_request();
    request.is_pooled_extraction = true;

    worker
        .process(&request, &workbench.acknowledger())
        .await
        .unwrap();

    // The source bytes are the pool key and the source file survives
    assert_eq!(std::fs::read(&source).unwrap(), b"source dicom bytes");

    let destination = workbench.destination("foo-an.dcm");
    assert!(std::fs::symlink_metadata(&destination)
        .unwrap()
        .file_type()
        .is_symlink());
    let target = std::fs::read_link(&destination).unwrap();
    assert_eq!(target, workbench.pool_root.path().join(SOURCE_BYTES_DIGEST));
    assert_eq!(std::fs::read(&target).unwrap(), b"source dicom bytes");

    let (_, status) = workbench.log.the_published_status();
    assert_eq!(status.status, ExtractedFileStatus::Copied);
}

#[tokio::test]
async fn an_existing_pool_entry_is_never_overwritten() {
    let workbench = TestWorkbench::new();
    let fs = Arc::new(LocalFilesystem);
    let pool = PoolManager::new(workbench.pool_root.path(), fs);

    // Simulate a pool entry another worker already published for this digest
    let pool_path = workbench.pool_root.path().join(FOUR_BYTES_DIGEST);
    std::fs::write(&pool_path, b"already published").unwrap();

    let candidate = workbench.filesystem_root.path().join("candidate");
    std::fs::write(&candidate, [1u8, 2, 3, 4]).unwrap();

    let destination = workbench.destination("linked.dcm");
    pool.link_into(&candidate, &destination, false).await.unwrap();

    // The loser of the race discards its candidate and links anyway
    assert!(!candidate.exists());
    assert_eq!(std::fs::read(&pool_path).unwrap(), b"already published");
    assert_eq!(std::fs::read_link(&destination).unwrap(), pool_path);
}

#[tokio::test]
async fn linking_replaces_an_existing_destination_file() {
    let workbench = TestWorkbench::new();
    let pool = PoolManager::new(workbench.pool_root.path(), Arc::new(LocalFilesystem));

    let candidate = workbench.filesystem_root.path().join("candidate");
    std::fs::write(&candidate, [1u8, 2, 3, 4]).unwrap();

    let destination = workbench.destination("linked.dcm");
    std::fs::write(&destination, b"stale regular file").unwrap();

    pool.link_into(&candidate, &destination, false).await.unwrap();

    assert!(std::fs::symlink_metadata(&destination)
        .unwrap()
        .file_type()
        .is_symlink());
    assert_eq!(std::fs::read(&destination).unwrap(), [1, 2, 3, 4]);
}
