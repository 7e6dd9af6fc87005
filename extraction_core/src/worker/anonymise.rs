use std::path::PathBuf;
use std::sync::Arc;

use common::constants::{DEFAULT_NO_VERIFY_ROUTING_KEY, DEFAULT_SUCCESS_ROUTING_KEY};
use common::dtos::extract_request::ExtractRequest;
use common::dtos::extract_status::{ExtractStatus, ExtractedFileStatus};
use tracing::info;

use super::{report_and_ack, ExtractionRoots, FatalProcessingError};
use crate::backends::AnonymiserBackend;
use crate::filesystem::Filesystem;
use crate::pool::PoolManager;
use crate::ports::{MessageAcknowledger, StatusPublisher};

const WORKER_NAME: &str = "AnonymiseExtractionWorker";

/// Routing keys for the anonymiser's two-way status split
#[derive(Debug, Clone)]
pub struct AnonymiserRoutingKeys {
    pub success: String,
    pub failure: String,
}

impl Default for AnonymiserRoutingKeys {
    fn default() -> Self {
        Self {
            success: DEFAULT_SUCCESS_ROUTING_KEY.to_string(),
            failure: DEFAULT_NO_VERIFY_ROUTING_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnonymiseWorkerConfig {
    pub roots: ExtractionRoots,
    pub pool_root: Option<PathBuf>,
    pub routing_keys: AnonymiserRoutingKeys,
    pub fail_if_source_writeable: bool,
}

/// Worker producing de-identified variants of the requested source files
pub struct AnonymiseExtractionWorker {
    roots: ExtractionRoots,
    routing_keys: AnonymiserRoutingKeys,
    fail_if_source_writeable: bool,
    backend: Arc<dyn AnonymiserBackend>,
    pool: Option<PoolManager>,
    publisher: Arc<dyn StatusPublisher>,
    fs: Arc<dyn Filesystem>,
}

impl AnonymiseExtractionWorker {
    pub fn new(
        config: AnonymiseWorkerConfig,
        backend: Arc<dyn AnonymiserBackend>,
        publisher: Arc<dyn StatusPublisher>,
        fs: Arc<dyn Filesystem>,
    ) -> Self {
        let pool = config
            .pool_root
            .map(|root| PoolManager::new(root, fs.clone()));

        Self {
            roots: config.roots,
            routing_keys: config.routing_keys,
            fail_if_source_writeable: config.fail_if_source_writeable,
            backend,
            pool,
            publisher,
            fs,
        }
    }

    /// Processes one anonymisation request end to end: validation, backend
    /// invocation, optional pooling, status report, acknowledgement
    #[tracing::instrument(
        name = "Processing anonymisation request",
        skip(self, request, acknowledger),
        fields(job_id = %request.job_id, dicom_file_path = %request.dicom_file_path, modality = %request.modality)
    )]
    pub async fn process(
        &self,
        request: &ExtractRequest,
        acknowledger: &dyn MessageAcknowledger,
    ) -> Result<(), FatalProcessingError> {
        // Identifiable requests belong to the copier; receiving one here is a
        // routing bug upstream, not a business failure
        if request.is_identifiable_extraction {
            return Err(FatalProcessingError::IdentifiableExtraction {
                worker: WORKER_NAME,
            });
        }

        let src = self.roots.file_system_root.join(&request.dicom_file_path);

        if !self.fs.file_exists(&src).await? {
            return self
                .reject(
                    request,
                    ExtractedFileStatus::FileMissing,
                    format!("Could not find file to anonymise: '{}'", src.display()),
                    acknowledger,
                )
                .await;
        }

        if self.fail_if_source_writeable && !self.fs.is_readonly(&src).await? {
            return self
                .reject(
                    request,
                    ExtractedFileStatus::ErrorWontRetry,
                    format!(
                        "Source file was writeable and FailIfSourceWriteable is set: '{}'",
                        src.display()
                    ),
                    acknowledger,
                )
                .await;
        }

        // The job-level machinery creates this directory up front; its
        // absence means the shared filesystem cannot be trusted right now
        let extraction_dir = self.roots.extraction_root.join(&request.extraction_directory);
        if !self.fs.dir_exists(&extraction_dir).await? {
            return Err(FatalProcessingError::ExtractionDirectoryMissing(
                extraction_dir,
            ));
        }

        let dst = extraction_dir.join(&request.output_path);
        if let Some(parent) = dst.parent() {
            self.fs.create_dir_all(parent).await?;
        }

        let outcome = if request.is_pooled_extraction {
            let pool = self
                .pool
                .as_ref()
                .ok_or(FatalProcessingError::PoolNotConfigured)?;

            let scratch = pool.scratch_file().await?;
            let outcome = self
                .backend
                .anonymise(&src, scratch.path(), &request.modality)
                .await;

            if outcome.is_success() {
                pool.link_into(scratch.path(), &dst, false).await?;
                // The pool owns the bytes now; nothing left to clean up
                scratch.release();
            }

            outcome
        } else {
            self.backend.anonymise(&src, &dst, &request.modality).await
        };

        if !outcome.is_success() {
            let message = outcome
                .message
                .unwrap_or_else(|| "Anonymisation failed".to_string());
            return self
                .reject(request, outcome.status, message, acknowledger)
                .await;
        }

        info!("Anonymised '{}' to '{}'", src.display(), dst.display());

        let status = ExtractStatus::success(request, ExtractedFileStatus::Anonymised);
        report_and_ack(
            self.publisher.as_ref(),
            &self.routing_keys.success,
            &status,
            acknowledger,
        )
        .await
    }

    async fn reject(
        &self,
        request: &ExtractRequest,
        status: ExtractedFileStatus,
        message: String,
        acknowledger: &dyn MessageAcknowledger,
    ) -> Result<(), FatalProcessingError> {
        info!(?status, "Rejecting extraction request: {}", message);

        let status = ExtractStatus::failure(request, status, message);
        report_and_ack(
            self.publisher.as_ref(),
            &self.routing_keys.failure,
            &status,
            acknowledger,
        )
        .await
    }
}
