//! Error types for the refresh pipeline
//!
//! All fallible library operations return `Result<T, Error>`.
//! Collaborator failures (fetch, store, dump) keep their own error types and
//! convert into this one at the driver boundary.

use std::path::PathBuf;

use thiserror::Error;

use crate::backup::DumpError;
use crate::fetch::FetchError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    /// SMILES syntax violation
    #[error("parse error: {0}")]
    Parse(String),

    /// Structure parsed but is chemically invalid (valence, kekulization)
    #[error("chemistry error: {0}")]
    Chemistry(String),

    /// Construct recognised but not handled by the canonical writer
    #[error("unsupported structure: {0}")]
    Unsupported(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dump(#[from] DumpError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, Error>;
