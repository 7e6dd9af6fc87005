use std::sync::Arc;

use chrono::Utc;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ExchangeKind,
};
use tracing::info;
use uuid::Uuid;

use crate::helper::error_chain_fmt;

/// Publisher used by the workers to emit extraction status messages
///
/// The enum definition gatekeeps publishing while the repository has no
/// channel yet: a RabbitMQ channel must not be shared between threads, so a
/// cloned repository starts `Idle` and each handler calls `try_init` to get
/// its own channel on the shared connection.
pub enum RabbitMqMessageRepository {
    Ready {
        /// RabbitMQ connection shared with other objects in different threads
        connection: Arc<Connection>,
        /// Channel owned by the handler that called `try_init`
        channel: Channel,
        exchange_name: String,
    },
    Idle {
        connection: Arc<Connection>,
        exchange_name: String,
    },
}

impl Clone for RabbitMqMessageRepository {
    /// Only clones the inner RabbitMQ connection and the exchange name, not
    /// the channel. The cloned repository is idle, waiting for `try_init`.
    fn clone(&self) -> Self {
        match self {
            Self::Idle {
                connection,
                exchange_name,
                ..
            }
            | Self::Ready {
                connection,
                exchange_name,
                ..
            } => Self::Idle {
                connection: connection.clone(),
                exchange_name: exchange_name.clone(),
            },
        }
    }
}

impl RabbitMqMessageRepository {
    /// Builds an idle repository from a shared RabbitMQ connection
    ///
    /// No channel is created and no exchange is declared here; `try_init`
    /// must be called inside each handler using this repository.
    pub fn new(connection: Arc<Connection>, exchange_name: &str) -> Self {
        Self::Idle {
            connection,
            exchange_name: exchange_name.to_string(),
        }
    }

    /// Initializes the repository: creates a channel and declares the
    /// (durable, topic) exchange the statuses are published to
    #[tracing::instrument(name = "Initializing RabbitMQ message repository", skip(self))]
    pub async fn try_init(self) -> Result<Self, RabbitMqMessageRepositoryError> {
        match self {
            Self::Ready { .. } => {
                info!("Already initialized");
                Ok(self)
            }

            Self::Idle {
                connection,
                exchange_name,
            } => {
                let channel = connection.create_channel().await?;

                let exchange_declare_options = ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                };

                // Idempotent
                channel
                    .exchange_declare(
                        exchange_name.as_str(),
                        ExchangeKind::Topic,
                        exchange_declare_options,
                        FieldTable::default(),
                    )
                    .await?;

                info!(
                    "Successfully declared exchange {} with properties: {:?}",
                    exchange_name, exchange_declare_options
                );

                Ok(Self::Ready {
                    connection,
                    channel,
                    exchange_name,
                })
            }
        }
    }

    /// Publishes a message to the repository exchange with the given routing key
    #[tracing::instrument(name = "Publishing message", skip(self, data))]
    pub async fn publish(
        &self,
        routing_key: &str,
        data: &[u8],
    ) -> Result<(), RabbitMqMessageRepositoryError> {
        match self {
            Self::Idle { .. } => Err(RabbitMqMessageRepositoryError::NotInitialized(
                "Cannot publish message, repository is not initialized".to_string(),
            )),

            Self::Ready {
                channel,
                exchange_name,
                ..
            } => {
                let current_time_ms = Utc::now().timestamp_millis() as u64;

                // Not using publisher confirmation
                channel
                    .basic_publish(
                        exchange_name,
                        routing_key,
                        BasicPublishOptions::default(),
                        data,
                        BasicProperties::default()
                            .with_timestamp(current_time_ms)
                            .with_message_id(Uuid::new_v4().to_string().into()),
                    )
                    .await?;

                Ok(())
            }
        }
    }
}

#[derive(thiserror::Error)]
pub enum RabbitMqMessageRepositoryError {
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error("{0}")]
    NotInitialized(String),
}

impl std::fmt::Debug for RabbitMqMessageRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
