//! Anonymiser backends.
//!
//! A backend turns one identifiable DICOM file into a de-identified one. The
//! set is closed: the primary CTP-style backend handles every modality except
//! those routed to the dedicated external tool.

pub mod ctp;
pub mod external_tool;
pub mod router;

use std::path::Path;

use async_trait::async_trait;
use common::dtos::extract_status::ExtractedFileStatus;

/// Result of one backend invocation
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    pub status: ExtractedFileStatus,
    pub message: Option<String>,
}

impl BackendOutcome {
    pub fn anonymised() -> Self {
        Self {
            status: ExtractedFileStatus::Anonymised,
            message: None,
        }
    }

    pub fn wont_retry(message: impl Into<String>) -> Self {
        Self {
            status: ExtractedFileStatus::ErrorWontRetry,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Produces a de-identified copy of `src` at `dst`
///
/// Failures are reported through the outcome; a backend never takes the
/// worker down on its own.
#[async_trait]
pub trait AnonymiserBackend: Send + Sync {
    async fn anonymise(&self, src: &Path, dst: &Path, modality: &str) -> BackendOutcome;
}
