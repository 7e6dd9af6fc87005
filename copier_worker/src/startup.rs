use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{future::join_all, TryFutureExt};
use lapin::Connection as RabbitMQConnection;
use tokio::task::JoinHandle;
use tracing::info;

use common::{
    constants::EXTRACT_STATUS_EXCHANGE, core::rabbitmq_message_repository::RabbitMqMessageRepository,
};
use extraction_core::{
    filesystem::LocalFilesystem,
    worker::{CopyWorkerConfig, ExtractionRoots},
};

use crate::{
    configuration::{ExtractionSettings, RabbitMQSettings, Settings},
    handlers::handler_file_copy::{self, RegisterHandlerFileCopyError},
};

/// Holds the broker connections and the running handler tasks
pub struct Application {
    // One connection for consuming messages, one for publishing statuses
    _rabbitmq_publishing_connection: Arc<RabbitMQConnection>,
    rabbitmq_queue_name_prefix: String,

    handlers: Vec<JoinHandle<Result<(), ApplicationError>>>,
}

impl Application {
    #[tracing::instrument(name = "Building copier worker application")]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        let worker_config = build_worker_config(&settings.extraction)?;

        let rabbitmq_consuming_connection =
            Arc::new(get_rabbitmq_connection(&settings.rabbitmq).await?);
        let rabbitmq_publishing_connection =
            Arc::new(get_rabbitmq_connection(&settings.rabbitmq).await?);

        let status_exchange_name = format!(
            "{}_{}",
            settings.rabbitmq.queue_name_prefix, EXTRACT_STATUS_EXCHANGE
        );
        let message_repository = RabbitMqMessageRepository::new(
            rabbitmq_publishing_connection.clone(),
            &status_exchange_name,
        );

        let mut app = Self {
            _rabbitmq_publishing_connection: rabbitmq_publishing_connection,
            rabbitmq_queue_name_prefix: settings.rabbitmq.queue_name_prefix,
            handlers: vec![],
        };

        app.prepare_message_handlers(rabbitmq_consuming_connection, message_repository, worker_config);

        Ok(app)
    }

    /// Prepares the asynchronous task running the file copy handler
    #[tracing::instrument(
        name = "Preparing the message handlers",
        skip(self, rabbitmq_consuming_connection, message_repository, worker_config)
    )]
    fn prepare_message_handlers(
        &mut self,
        rabbitmq_consuming_connection: Arc<RabbitMQConnection>,
        message_repository: RabbitMqMessageRepository,
        worker_config: CopyWorkerConfig,
    ) {
        let handler = tokio::spawn(
            handler_file_copy::register_handler(
                rabbitmq_consuming_connection,
                self.rabbitmq_queue_name_prefix.clone(),
                message_repository.clone(),
                worker_config,
                Arc::new(LocalFilesystem),
            )
            .map_err(ApplicationError::from),
        );

        self.handlers.push(handler);
    }

    /// Runs the application until its handlers stop
    ///
    /// self is moved in order for the application not to drop out of scope
    pub async fn run_until_stopped(self) -> Result<(), ApplicationError> {
        let handler_results = join_all(self.handlers).await;

        info!(
            "Application stopped with the following results: {:?}",
            handler_results
        );

        info!("👋 Bye!");
        Ok(())
    }
}

/// Creates a connection to RabbitMQ
pub async fn get_rabbitmq_connection(
    config: &RabbitMQSettings,
) -> Result<RabbitMQConnection, lapin::Error> {
    RabbitMQConnection::connect(&config.get_uri(), config.get_connection_properties()).await
}

/// Validates the configured roots and assembles the worker configuration
///
/// Both roots must exist before the worker starts consuming.
fn build_worker_config(settings: &ExtractionSettings) -> Result<CopyWorkerConfig, ApplicationError> {
    ensure_directory_exists(&settings.file_system_root)?;
    ensure_directory_exists(&settings.extraction_root)?;

    Ok(CopyWorkerConfig {
        roots: ExtractionRoots {
            file_system_root: settings.file_system_root.clone(),
            extraction_root: settings.extraction_root.clone(),
        },
        pool_root: settings.pool_root.clone(),
        no_verify_routing_key: settings.no_verify_routing_key.clone(),
    })
}

fn ensure_directory_exists(path: &Path) -> Result<(), ApplicationError> {
    if !path.is_dir() {
        return Err(ApplicationError::MissingDirectory(path.to_path_buf()));
    }

    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationError {
    #[error("Configured directory does not exist: '{}'", .0.display())]
    MissingDirectory(PathBuf),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error(transparent)]
    RegisterHandlerFileCopyError(#[from] RegisterHandlerFileCopyError),
}
