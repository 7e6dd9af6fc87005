use std::sync::Arc;

use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, QueueDeclareOptions},
    types::FieldTable,
    Connection as RabbitMQConnection,
};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use common::{
    constants::FILE_COPY_QUEUE,
    core::rabbitmq_message_repository::{
        RabbitMqMessageRepository, RabbitMqMessageRepositoryError,
    },
    dtos::extract_request::ExtractRequest,
    helper::error_chain_fmt,
};
use extraction_core::{
    filesystem::Filesystem,
    rabbitmq::DeliveryAcknowledger,
    worker::{CopyExtractionWorker, CopyWorkerConfig, FatalProcessingError},
};

pub fn queue_name(queue_name_prefix: &str) -> String {
    format!("{}_{}", queue_name_prefix, FILE_COPY_QUEUE)
}

#[derive(thiserror::Error)]
pub enum RegisterHandlerFileCopyError {
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error(transparent)]
    RabbitMQMessageRepositoryError(#[from] RabbitMqMessageRepositoryError),
    #[error(transparent)]
    FatalProcessingError(#[from] FatalProcessingError),
}

impl std::fmt::Debug for RegisterHandlerFileCopyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Registers the file copy handler on its queue
///
/// It handles messages one by one, there is no handling messages in parallel.
///
/// The message repository is initialized inside the handler to avoid sharing
/// a RabbitMQ channel between threads; the worker is then built around it.
#[tracing::instrument(
    name = "Register file copy handler",
    skip(rabbitmq_consuming_connection, message_repository, worker_config, fs)
)]
pub async fn register_handler(
    rabbitmq_consuming_connection: Arc<RabbitMQConnection>,
    queue_name_prefix: String,
    // Not an `Arc` shared reference as we want to initialize a new repository for each handler
    message_repository: RabbitMqMessageRepository,
    worker_config: CopyWorkerConfig,
    fs: Arc<dyn Filesystem>,
) -> Result<(), RegisterHandlerFileCopyError> {
    let channel = rabbitmq_consuming_connection.create_channel().await?;

    let queue_name = queue_name(&queue_name_prefix);

    let _queue = channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;

    let consumer_options = BasicConsumeOptions {
        no_ack: false,
        ..BasicConsumeOptions::default()
    };

    let mut consumer = channel
        .basic_consume(&queue_name, "", consumer_options, FieldTable::default())
        .await?;

    // Inits for this specific handler
    let message_repository = message_repository.try_init().await?;
    let worker = CopyExtractionWorker::new(worker_config, Arc::new(message_repository), fs);

    info!(
        "📡 Handler consuming from queue {}, waiting for messages ...",
        queue_name
    );

    while let Some(delivery) = consumer.next().await {
        let outcome: Result<(), FatalProcessingError> = async {
            let delivery = match delivery {
                // Carries the delivery alongside its channel
                Ok(delivery) => delivery,
                // Carries the error and is always followed by Ok(None)
                Err(error) => {
                    error!(
                        ?error,
                        "Failed to consume queue message on queue {}", queue_name
                    );
                    return Ok(());
                }
            };

            let request = match ExtractRequest::try_parsing(&delivery.data) {
                Ok(request) => request,
                Err(error) => {
                    error!(
                        ?error,
                        "Failed to parse file copy request message data: {}", error
                    );
                    return Ok(());
                }
            };

            info!(?request, "Received file copy request");

            let acknowledger = DeliveryAcknowledger::new(&delivery);
            worker.process(&request, &acknowledger).await
        }
        .instrument(info_span!(
            "Handling consumed message",
            queue = %queue_name,
            message_id = %Uuid::new_v4(),
        ))
        .await;

        if let Err(error) = outcome {
            // Neither acked nor nacked: the broker redelivers once the
            // worker restarts
            error!(
                ?error,
                "Fatal error while processing a file copy request, stopping this handler"
            );
            return Err(error.into());
        }
    }

    Ok(())
}
