//! Broker-facing seams of the extraction workers.
//!
//! The broker transport itself lives outside the core; the workers only see
//! these two narrow interfaces.

use async_trait::async_trait;
use common::dtos::extract_status::ExtractStatus;

/// Sends a status message on a routing key
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn send(&self, routing_key: &str, status: &ExtractStatus) -> Result<(), PublishError>;
}

/// Finalises the delivery of the message currently being processed
#[async_trait]
pub trait MessageAcknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), AckError>;

    async fn nack(&self, requeue: bool) -> Result<(), AckError>;
}

#[derive(thiserror::Error, Debug)]
#[error("Failed to publish status message: {context}")]
pub struct PublishError {
    context: String,
}

impl PublishError {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("Failed to finalise message delivery: {context}")]
pub struct AckError {
    context: String,
}

impl AckError {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}
