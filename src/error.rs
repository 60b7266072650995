use thiserror::Error;

/// Errors surfaced while bootstrapping a streaming job.
///
/// Failures reported by the stream admin service are carried through as-is so that a job
/// aborts at startup with the service's own message.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Unable to connect to stream admin service at {uri}: {message}")]
    Connection { uri: String, message: String },

    #[error("Stream admin service error: {0}")]
    Admin(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

#[macro_export]
macro_rules! config_err {
    ($($arg:tt)*) => {
        $crate::error::BootstrapError::Config(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! admin_err {
    ($($arg:tt)*) => {
        $crate::error::BootstrapError::Admin(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! storage_err {
    ($($arg:tt)*) => {
        $crate::error::BootstrapError::Storage(format!($($arg)*))
    };
}
