use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{AnonymiserBackend, BackendOutcome};

/// Modality handed to the dedicated external tool when one is configured.
/// The match is case-sensitive: modalities are upper-case codes on the wire.
const EXTERNAL_TOOL_MODALITY: &str = "XA";

/// Default backend: dispatches each file by modality
///
/// The primary backend is always present; the external-tool backend exists
/// iff its tool path was configured.
pub struct ModalityRouter {
    primary: Arc<dyn AnonymiserBackend>,
    external: Option<Arc<dyn AnonymiserBackend>>,
}

impl ModalityRouter {
    pub fn new(
        primary: Arc<dyn AnonymiserBackend>,
        external: Option<Arc<dyn AnonymiserBackend>>,
    ) -> Self {
        Self { primary, external }
    }
}

#[async_trait]
impl AnonymiserBackend for ModalityRouter {
    async fn anonymise(&self, src: &Path, dst: &Path, modality: &str) -> BackendOutcome {
        if modality == EXTERNAL_TOOL_MODALITY {
            if let Some(external) = &self.external {
                debug!(modality, "Routing to the external tool backend");
                return external.anonymise(src, dst, modality).await;
            }
        }

        self.primary.anonymise(src, dst, modality).await
    }
}
