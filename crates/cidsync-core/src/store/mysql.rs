//! MySQL table store
//!
//! Each operation opens its own connection, runs inside a transaction and
//! closes the connection on return. `LOAD DATA LOCAL INFILE` is served by a
//! handler that only ever hands out the one file the statement names.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use ::mysql::prelude::Queryable;
use ::mysql::{Conn, LocalInfileHandler, Opts, OptsBuilder, TxOpts};
use tracing::{debug, info};

use super::{StoreError, TableStore};
use crate::config::Database;

pub struct MysqlStore {
    settings: Database,
}

impl MysqlStore {
    pub fn new(settings: Database) -> Self {
        MysqlStore { settings }
    }

    fn target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.settings.user, self.settings.host, self.settings.port, self.settings.name
        )
    }

    fn base_opts(&self) -> OptsBuilder {
        let password = if self.settings.password.is_empty() {
            None
        } else {
            Some(self.settings.password.clone())
        };
        OptsBuilder::new()
            .ip_or_hostname(Some(self.settings.host.clone()))
            .tcp_port(self.settings.port)
            .user(Some(self.settings.user.clone()))
            .pass(password)
            .db_name(Some(self.settings.name.clone()))
    }

    fn connect(&self, opts: OptsBuilder) -> Result<Conn, StoreError> {
        Conn::new(Opts::from(opts)).map_err(|e| StoreError::Connect {
            target: self.target(),
            message: e.to_string(),
        })
    }

    /// Run one statement in a transaction; returns affected rows
    fn execute(
        &self,
        opts: OptsBuilder,
        operation: &'static str,
        table: &str,
        sql: &str,
    ) -> Result<u64, StoreError> {
        let failed = |e: ::mysql::Error| StoreError::Operation {
            operation,
            table: table.to_string(),
            message: e.to_string(),
        };

        let mut conn = self.connect(opts)?;
        let mut tx = conn.start_transaction(TxOpts::default()).map_err(failed)?;
        let outcome = tx.query_iter(sql).map(|result| result.affected_rows());
        let affected = match outcome {
            Ok(n) => n,
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    debug!(table, error = %rollback, "rollback failed");
                }
                return Err(failed(e));
            }
        };
        tx.commit().map_err(failed)?;
        Ok(affected)
    }
}

impl TableStore for MysqlStore {
    fn truncate(&self, table: &str) -> Result<(), StoreError> {
        let sql = format!("TRUNCATE TABLE `{}`", table);
        self.execute(self.base_opts(), "truncate", table, &sql)?;
        info!(table, "table truncated");
        Ok(())
    }

    fn bulk_load(&self, file: &Path, table: &str) -> Result<u64, StoreError> {
        File::open(file).map_err(|source| StoreError::Input {
            path: file.to_path_buf(),
            source,
        })?;

        let name = file.to_string_lossy().into_owned();
        let allowed: PathBuf = file.to_path_buf();
        let handler = LocalInfileHandler::new(move |requested, writer| {
            if requested != name.as_bytes() {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "server requested an unexpected file",
                ));
            }
            let mut source = File::open(&allowed)?;
            io::copy(&mut source, writer)?;
            Ok(())
        });
        let opts = self.base_opts().local_infile_handler(Some(handler));

        let sql = format!(
            "LOAD DATA LOCAL INFILE '{}' INTO TABLE `{}` FIELDS TERMINATED BY '\\t' LINES TERMINATED BY '\\n'",
            escape_literal(&file.to_string_lossy()),
            table
        );
        let rows = self.execute(opts, "bulk load", table, &sql)?;
        info!(table, rows, file = %file.display(), "table loaded");
        Ok(rows)
    }
}

/// Escape a string for use inside a single-quoted SQL literal
fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}
