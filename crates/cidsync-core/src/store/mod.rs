//! Relational table store
//!
//! The pipeline needs exactly two operations from the database: empty a table
//! and bulk-load a tab-separated file into it. Both run on their own
//! connection and either take effect completely or not at all.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use self::mysql::MysqlStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection could be established
    #[error("cannot connect to database at {target}: {message}")]
    Connect { target: String, message: String },

    /// Statement failed; the transaction was rolled back
    #[error("{operation} of table {table} failed: {message}")]
    Operation {
        operation: &'static str,
        table: String,
        message: String,
    },

    /// The file to load could not be read
    #[error("cannot read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Destination tables for the refreshed data
pub trait TableStore {
    /// Remove all rows, keeping the table definition
    fn truncate(&self, table: &str) -> Result<(), StoreError>;

    /// Load a tab-separated, newline-terminated file; returns rows inserted
    fn bulk_load(&self, file: &Path, table: &str) -> Result<u64, StoreError>;
}
