//! The per-message state machine shared by the two worker flavours.
//!
//! Business failures (missing source, writeable source, backend errors)
//! become a published status followed by an ack. Anything unexpected is a
//! `FatalProcessingError`: the caller must neither ack nor nack and stop
//! consuming, so the broker's redelivery surfaces the problem.

pub mod anonymise;
pub mod copy;

pub use anonymise::{AnonymiseExtractionWorker, AnonymiseWorkerConfig, AnonymiserRoutingKeys};
pub use copy::{CopyExtractionWorker, CopyWorkerConfig};

use std::path::PathBuf;

use common::dtos::extract_status::ExtractStatus;
use common::helper::error_chain_fmt;

use crate::ports::{AckError, MessageAcknowledger, PublishError, StatusPublisher};

/// Absolute directories every request path is resolved against
#[derive(Debug, Clone)]
pub struct ExtractionRoots {
    pub file_system_root: PathBuf,
    pub extraction_root: PathBuf,
}

#[derive(thiserror::Error)]
pub enum FatalProcessingError {
    #[error("{worker} should not handle identifiable extraction messages")]
    IdentifiableExtraction { worker: &'static str },

    #[error("Expected extraction directory to exist: '{}'", .0.display())]
    ExtractionDirectoryMissing(PathBuf),

    #[error("Pooled extraction requested but no file pool is configured")]
    PoolNotConfigured,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Acknowledge(#[from] AckError),
}

impl std::fmt::Debug for FatalProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Publishes the status report, then acks the delivery.
///
/// The order matters: a crash between the two redelivers the message and
/// downstream sees a duplicate status (at-least-once).
pub(crate) async fn report_and_ack(
    publisher: &dyn StatusPublisher,
    routing_key: &str,
    status: &ExtractStatus,
    acknowledger: &dyn MessageAcknowledger,
) -> Result<(), FatalProcessingError> {
    publisher.send(routing_key, status).await?;
    acknowledger.ack().await?;

    Ok(())
}
