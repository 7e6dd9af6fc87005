use std::path::PathBuf;

use lapin::ConnectionProperties;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use common::constants::DEFAULT_NO_VERIFY_ROUTING_KEY;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rabbitmq: RabbitMQSettings,
    pub extraction: ExtractionSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RabbitMQSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    /// Useful to create parallel queues and exchanges during tests for example.
    pub queue_name_prefix: String,
}

impl RabbitMQSettings {
    pub fn get_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}",
            self.username,
            self.password.expose_secret(),
            self.host,
            self.port
        )
    }

    pub fn get_connection_properties(&self) -> ConnectionProperties {
        ConnectionProperties::default()
            // Use tokio executor and reactor.
            // At the moment the reactor is only available for unix.
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio)
    }
}

/// The copier never verifies its outputs downstream, so it carries a single
/// routing key instead of the anonymiser's success/failure pair.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionSettings {
    /// Root of the shared filesystem holding the source DICOM files
    pub file_system_root: PathBuf,
    /// Root under which per-job extraction directories live
    pub extraction_root: PathBuf,
    /// Content-addressed pool; pooled extraction is enabled iff this is set
    pub pool_root: Option<PathBuf>,
    #[serde(default = "default_no_verify_routing_key")]
    pub no_verify_routing_key: String,
}

fn default_no_verify_routing_key() -> String {
    DEFAULT_NO_VERIFY_ROUTING_KEY.to_string()
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yaml` holds settings shared by all environments; a per-environment
/// file is layered on top, selected by the `APP_ENVIRONMENT` env var
/// (`develop` if unset). Environment variables prefixed with `APP` and
/// separated by `__` override both, e.g. `APP_RABBITMQ__PORT=5673`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "develop".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT.");
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environment for the worker.
pub enum Environment {
    Develop,
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "develop" => Ok(Self::Develop),
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `develop`, `local` or `production`.",
                other
            )),
        }
    }
}
