//! RabbitMQ adapters for the broker-facing ports.

use async_trait::async_trait;
use common::core::rabbitmq_message_repository::RabbitMqMessageRepository;
use common::dtos::extract_status::ExtractStatus;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};

use crate::ports::{AckError, MessageAcknowledger, PublishError, StatusPublisher};

/// Statuses are serialized to JSON and published through the shared message
/// repository (the handler must have called `try_init` on it).
#[async_trait]
impl StatusPublisher for RabbitMqMessageRepository {
    async fn send(&self, routing_key: &str, status: &ExtractStatus) -> Result<(), PublishError> {
        let data = status
            .try_serializing()
            .map_err(|error| PublishError::new(error.to_string()))?;

        self.publish(routing_key, data.as_bytes())
            .await
            .map_err(|error| PublishError::new(error.to_string()))
    }
}

/// Acknowledger bound to one delivery's tag
pub struct DeliveryAcknowledger<'a> {
    delivery: &'a Delivery,
}

impl<'a> DeliveryAcknowledger<'a> {
    pub fn new(delivery: &'a Delivery) -> Self {
        Self { delivery }
    }
}

#[async_trait]
impl MessageAcknowledger for DeliveryAcknowledger<'_> {
    async fn ack(&self) -> Result<(), AckError> {
        self.delivery
            .ack(BasicAckOptions::default())
            .await
            .map_err(|error| AckError::new(error.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), AckError> {
        self.delivery
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await
            .map_err(|error| AckError::new(error.to_string()))
    }
}
