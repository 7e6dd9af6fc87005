use std::path::PathBuf;
use std::sync::Arc;

use common::constants::DEFAULT_NO_VERIFY_ROUTING_KEY;
use common::dtos::extract_request::ExtractRequest;
use common::dtos::extract_status::{ExtractStatus, ExtractedFileStatus};
use tracing::{info, warn};

use super::{report_and_ack, ExtractionRoots, FatalProcessingError};
use crate::filesystem::Filesystem;
use crate::pool::PoolManager;
use crate::ports::{MessageAcknowledger, StatusPublisher};

#[derive(Debug, Clone)]
pub struct CopyWorkerConfig {
    pub roots: ExtractionRoots,
    pub pool_root: Option<PathBuf>,
    pub no_verify_routing_key: String,
}

impl CopyWorkerConfig {
    pub fn new(roots: ExtractionRoots, pool_root: Option<PathBuf>) -> Self {
        Self {
            roots,
            pool_root,
            no_verify_routing_key: DEFAULT_NO_VERIFY_ROUTING_KEY.to_string(),
        }
    }
}

/// Worker producing bit-identical copies of the requested source files
///
/// Used for identifiable extractions, where no anonymisation happens and no
/// downstream verification is wanted: every status, success or failure, goes
/// out on the no-verify routing key.
pub struct CopyExtractionWorker {
    roots: ExtractionRoots,
    no_verify_routing_key: String,
    pool: Option<PoolManager>,
    publisher: Arc<dyn StatusPublisher>,
    fs: Arc<dyn Filesystem>,
}

impl CopyExtractionWorker {
    pub fn new(
        config: CopyWorkerConfig,
        publisher: Arc<dyn StatusPublisher>,
        fs: Arc<dyn Filesystem>,
    ) -> Self {
        let pool = config
            .pool_root
            .map(|root| PoolManager::new(root, fs.clone()));

        Self {
            roots: config.roots,
            no_verify_routing_key: config.no_verify_routing_key,
            pool,
            publisher,
            fs,
        }
    }

    /// Processes one copy request end to end: validation, materialisation,
    /// status report, acknowledgement
    #[tracing::instrument(
        name = "Processing file copy request",
        skip(self, request, acknowledger),
        fields(job_id = %request.job_id, dicom_file_path = %request.dicom_file_path)
    )]
    pub async fn process(
        &self,
        request: &ExtractRequest,
        acknowledger: &dyn MessageAcknowledger,
    ) -> Result<(), FatalProcessingError> {
        let src = self.roots.file_system_root.join(&request.dicom_file_path);

        if !self.fs.file_exists(&src).await? {
            let status = ExtractStatus::failure(
                request,
                ExtractedFileStatus::FileMissing,
                format!("Could not find '{}'", src.display()),
            );
            return report_and_ack(
                self.publisher.as_ref(),
                &self.no_verify_routing_key,
                &status,
                acknowledger,
            )
            .await;
        }

        let extraction_dir = self.roots.extraction_root.join(&request.extraction_directory);
        let dst = extraction_dir.join(&request.output_path);
        if let Some(parent) = dst.parent() {
            self.fs.create_dir_all(parent).await?;
        }

        if request.is_pooled_extraction {
            let pool = self
                .pool
                .as_ref()
                .ok_or(FatalProcessingError::PoolNotConfigured)?;
            // The source bytes are the pool key; the source must be preserved
            pool.link_into(&src, &dst, true).await?;
        } else {
            if self.fs.file_exists(&dst).await? {
                warn!("Overwriting existing output file: '{}'", dst.display());
            }
            self.fs.copy(&src, &dst).await?;
        }

        info!("Copied '{}' to '{}'", src.display(), dst.display());

        let status = ExtractStatus::success(request, ExtractedFileStatus::Copied);
        report_and_ack(
            self.publisher.as_ref(),
            &self.no_verify_routing_key,
            &status,
            acknowledger,
        )
        .await
    }
}
