use std::path::PathBuf;

use thiserror::Error;

/// Configuration and input-validation failures.
///
/// Everything in here is fatal to the call that raised it: nothing is
/// retried and no partial result is produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "model family '{family}' with data format '{format}' is not supported \
         (supported: {supported})"
    )]
    UnsupportedConfiguration {
        family: String,
        format: String,
        supported: String,
    },

    #[error("valid time '{value}' does not match format '{format}'")]
    MalformedTimestamp { value: String, format: String },

    #[error("invalid file name template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("file name template '{template}' needs a domain but none was given")]
    MissingDomain { template: String },

    #[error("invalid registry entry '{key}': {reason}")]
    InvalidRegistry { key: String, reason: String },

    #[error("failed to parse registry document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read registry document {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
