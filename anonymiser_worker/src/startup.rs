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
    backends::{
        ctp::CtpAnonymiserBackend,
        external_tool::{ExternalToolBackend, ExternalToolConfigError},
        router::ModalityRouter,
        AnonymiserBackend,
    },
    filesystem::LocalFilesystem,
    worker::{AnonymiseWorkerConfig, AnonymiserRoutingKeys, ExtractionRoots},
};

use crate::{
    configuration::{AnonymiserSettings, ExtractionSettings, RabbitMQSettings, Settings},
    handlers::handler_extract_file::{self, RegisterHandlerExtractFileError},
};

/// Holds the broker connections and the running handler tasks
pub struct Application {
    // One connection for consuming messages, one for publishing statuses
    _rabbitmq_publishing_connection: Arc<RabbitMQConnection>,
    rabbitmq_queue_name_prefix: String,

    handlers: Vec<JoinHandle<Result<(), ApplicationError>>>,
}

impl Application {
    #[tracing::instrument(name = "Building anonymiser worker application")]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        let worker_config = build_worker_config(&settings.extraction)?;
        let backend = build_backend(&settings.anonymiser)?;

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

        app.prepare_message_handlers(
            rabbitmq_consuming_connection,
            message_repository,
            worker_config,
            backend,
        );

        Ok(app)
    }

    /// Prepares the asynchronous task running the extraction request handler
    #[tracing::instrument(
        name = "Preparing the message handlers",
        skip(self, rabbitmq_consuming_connection, message_repository, worker_config, backend)
    )]
    fn prepare_message_handlers(
        &mut self,
        rabbitmq_consuming_connection: Arc<RabbitMQConnection>,
        message_repository: RabbitMqMessageRepository,
        worker_config: AnonymiseWorkerConfig,
        backend: Arc<dyn AnonymiserBackend>,
    ) {
        let handler = tokio::spawn(
            handler_extract_file::register_handler(
                rabbitmq_consuming_connection,
                self.rabbitmq_queue_name_prefix.clone(),
                message_repository.clone(),
                worker_config,
                backend,
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
fn build_worker_config(
    settings: &ExtractionSettings,
) -> Result<AnonymiseWorkerConfig, ApplicationError> {
    ensure_directory_exists(&settings.file_system_root)?;
    ensure_directory_exists(&settings.extraction_root)?;

    Ok(AnonymiseWorkerConfig {
        roots: ExtractionRoots {
            file_system_root: settings.file_system_root.clone(),
            extraction_root: settings.extraction_root.clone(),
        },
        pool_root: settings.pool_root.clone(),
        routing_keys: AnonymiserRoutingKeys {
            success: settings.routing_key_success.clone(),
            failure: settings.routing_key_failure.clone(),
        },
        fail_if_source_writeable: settings.fail_if_source_writeable,
    })
}

/// Builds the modality router: the CTP-style primary backend plus the
/// external XA backend when its tool path is configured
fn build_backend(
    settings: &AnonymiserSettings,
) -> Result<Arc<dyn AnonymiserBackend>, ApplicationError> {
    let primary = Arc::new(CtpAnonymiserBackend::new(&settings.ctp_tool_path)?);

    let external = match &settings.xa_tool_path {
        Some(tool_path) => {
            Some(Arc::new(ExternalToolBackend::new(tool_path)?) as Arc<dyn AnonymiserBackend>)
        }
        None => None,
    };

    Ok(Arc::new(ModalityRouter::new(primary, external)))
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
    ExternalToolConfigError(#[from] ExternalToolConfigError),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error(transparent)]
    RegisterHandlerExtractFileError(#[from] RegisterHandlerExtractFileError),
}
