//! In-memory table store for dry runs and tests

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::{StoreError, TableStore};

/// Tables held as rows of tab-separated fields
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<BTreeMap<String, Vec<Vec<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.borrow().get(table).map_or(0, |rows| rows.len())
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<String>> {
        self.tables.borrow().get(table).cloned().unwrap_or_default()
    }
}

impl TableStore for MemoryStore {
    fn truncate(&self, table: &str) -> Result<(), StoreError> {
        self.tables.borrow_mut().entry(table.to_string()).or_default().clear();
        debug!(table, "truncated (memory)");
        Ok(())
    }

    fn bulk_load(&self, file: &Path, table: &str) -> Result<u64, StoreError> {
        let bytes = fs::read(file).map_err(|source| StoreError::Input {
            path: file.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let loaded: Vec<Vec<String>> = text
            .split_terminator('\n')
            .map(|line| line.split('\t').map(str::to_string).collect())
            .collect();
        let count = loaded.len() as u64;
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .extend(loaded);
        debug!(table, rows = count, "loaded (memory)");
        Ok(count)
    }
}
