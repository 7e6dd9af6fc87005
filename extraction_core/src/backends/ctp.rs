use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::external_tool::{ExternalToolConfigError, ExternalToolRunner};
use super::{AnonymiserBackend, BackendOutcome};

/// Primary anonymiser backend
///
/// Wraps the configured CTP-style anonymiser executable. All tag- and
/// pixel-level anonymisation logic lives in that tool; this backend only
/// supervises the per-file invocation.
pub struct CtpAnonymiserBackend {
    runner: ExternalToolRunner,
}

impl CtpAnonymiserBackend {
    pub fn new(tool_path: impl Into<PathBuf>) -> Result<Self, ExternalToolConfigError> {
        Ok(Self {
            runner: ExternalToolRunner::new(tool_path)?,
        })
    }

    pub fn from_runner(runner: ExternalToolRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl AnonymiserBackend for CtpAnonymiserBackend {
    async fn anonymise(&self, src: &Path, dst: &Path, _modality: &str) -> BackendOutcome {
        self.runner.run(src, dst).await
    }
}
