use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::helper::error_chain_fmt;

/// Per-file extraction request consumed by the workers
///
/// One message asks for one derived file: either a verbatim copy or an
/// anonymised variant of a single DICOM file on the shared filesystem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    /// Identifier of the extraction job this file belongs to
    pub job_id: Uuid,

    /// When the job was submitted
    pub submitted_at: DateTime<Utc>,

    /// Opaque project identifier, carried through to the status message
    pub project: String,

    /// Relative path under the configured extraction root
    pub extraction_directory: String,

    /// Relative path of the source file under the configured filesystem root
    pub dicom_file_path: String,

    /// Relative path of the derived file under `extraction_directory`
    pub output_path: String,

    /// DICOM modality code, e.g. `CT`, `XA`, `SR`
    pub modality: String,

    /// True when the extraction must keep identifiable data.
    /// The anonymiser worker refuses such messages.
    pub is_identifiable_extraction: bool,

    /// True when the output should be stored once in the content-addressed
    /// pool and linked into the extraction directory
    pub is_pooled_extraction: bool,
}

impl ExtractRequest {
    pub fn try_parsing(data: &[u8]) -> Result<Self, ExtractRequestError> {
        let data = std::str::from_utf8(data)?;
        let request = serde_json::from_str(data)
            .map_err(|e| ExtractRequestError::InvalidJsonData(e, data.to_string()))?;

        Ok(request)
    }
}

#[derive(thiserror::Error)]
pub enum ExtractRequestError {
    #[error("Data could not be converted from utf8 u8 vector to string")]
    InvalidStringData(#[from] std::str::Utf8Error),

    #[error("Data did not represent a valid JSON object: {0}. Data: {1}")]
    InvalidJsonData(serde_json::Error, String),
}

impl std::fmt::Debug for ExtractRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
