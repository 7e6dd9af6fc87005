use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dtos::extract_request::ExtractRequest, helper::error_chain_fmt};

/// Final state of one processed extraction request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ExtractedFileStatus {
    /// The copier produced a bit-identical copy of the source
    Copied,
    /// The anonymiser backend produced a de-identified variant
    Anonymised,
    /// The source file was not found on the shared filesystem
    FileMissing,
    /// The request failed and redelivering it would not help
    ErrorWontRetry,
}

impl ExtractedFileStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Copied | Self::Anonymised)
    }
}

/// Status report published after each processed request
///
/// Downstream consumers must tolerate duplicates for the same
/// `(job_id, dicom_file_path)` tuple: the status is published before the
/// delivery is acknowledged, so a crash between the two redelivers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStatus {
    pub job_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub project: String,
    pub extraction_directory: String,
    pub dicom_file_path: String,
    pub status: ExtractedFileStatus,
    pub status_message: Option<String>,
    /// Relative output path; `None` on any failure
    pub output_file_path: Option<String>,
}

impl ExtractStatus {
    /// Builds a success report pointing at the request's output path
    pub fn success(request: &ExtractRequest, status: ExtractedFileStatus) -> Self {
        Self {
            job_id: request.job_id,
            submitted_at: request.submitted_at,
            project: request.project.clone(),
            extraction_directory: request.extraction_directory.clone(),
            dicom_file_path: request.dicom_file_path.clone(),
            status,
            status_message: None,
            output_file_path: Some(request.output_path.clone()),
        }
    }

    /// Builds a failure report; the output path is always cleared
    pub fn failure(
        request: &ExtractRequest,
        status: ExtractedFileStatus,
        status_message: impl Into<String>,
    ) -> Self {
        Self {
            job_id: request.job_id,
            submitted_at: request.submitted_at,
            project: request.project.clone(),
            extraction_directory: request.extraction_directory.clone(),
            dicom_file_path: request.dicom_file_path.clone(),
            status,
            status_message: Some(status_message.into()),
            output_file_path: None,
        }
    }

    pub fn try_serializing(&self) -> Result<String, ExtractStatusError> {
        serde_json::to_string(self).map_err(ExtractStatusError::InvalidStatus)
    }

    pub fn try_parsing(data: &[u8]) -> Result<Self, ExtractStatusError> {
        let data = std::str::from_utf8(data)?;
        let status = serde_json::from_str(data)
            .map_err(|e| ExtractStatusError::InvalidJsonData(e, data.to_string()))?;

        Ok(status)
    }
}

#[derive(thiserror::Error)]
pub enum ExtractStatusError {
    #[error("Data could not be converted from utf8 u8 vector to string")]
    InvalidStringData(#[from] std::str::Utf8Error),

    #[error("Data did not represent a valid JSON object: {0}. Data: {1}")]
    InvalidJsonData(serde_json::Error, String),

    #[error("Status could not be serialized to its JSON representation: {0}")]
    InvalidStatus(serde_json::Error),
}

impl std::fmt::Debug for ExtractStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
