use std::path::PathBuf;

use thiserror::Error;
use wxout_contracts::ConfigError;

use crate::readers::ReaderError;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no reader registered for data format '{format}' (registered: {registered})")]
    UnsupportedFormat { format: String, registered: String },

    #[error("unknown attribute category '{category}' (known: {known})")]
    UnknownCategory { category: String, known: String },

    #[error("no model output file has been read yet")]
    NoDataLoaded,

    #[error("{category} attribute '{canonical}' maps to field '{field}', which is not in the file")]
    MissingField {
        category: String,
        canonical: String,
        field: String,
    },

    #[error("failed to read field '{field}' from {}: {source}", .path.display())]
    FieldRead {
        field: String,
        path: PathBuf,
        #[source]
        source: ReaderError,
    },

    #[error("invalid search pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error(transparent)]
    FileRead(#[from] FileReadError),
}

/// A single model output file that could not be opened.
#[derive(Debug, Error)]
#[error("failed to open {}: {source}", .path.display())]
pub struct FileReadError {
    pub path: PathBuf,
    #[source]
    pub source: ReaderError,
}

pub type Result<T> = std::result::Result<T, LoadError>;
