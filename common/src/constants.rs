//! Names shared between the workers and the services consuming their statuses.

/// Queue consumed by the anonymiser worker, prefixed per environment.
pub const EXTRACT_FILE_QUEUE: &str = "extract_file";

/// Queue consumed by the copier worker, prefixed per environment.
pub const FILE_COPY_QUEUE: &str = "file_copy";

/// Topic exchange receiving every `ExtractStatus` message.
pub const EXTRACT_STATUS_EXCHANGE: &str = "extract_status";

/// Routing key for statuses that should go through downstream verification.
pub const DEFAULT_SUCCESS_ROUTING_KEY: &str = "verify";

/// Routing key for statuses that skip downstream verification.
pub const DEFAULT_NO_VERIFY_ROUTING_KEY: &str = "noverify";
