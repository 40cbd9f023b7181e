//! Logical backup of the destination tables
//!
//! Production dumps go through the `mysqldump` client. The password is handed
//! over in the child's environment (`MYSQL_PWD`), never on its command line.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::info;

use crate::config::Database;

#[derive(Debug, Error)]
pub enum DumpError {
    /// The dump program could not be started
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The dump program ran but reported failure
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("cannot write dump to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Produces a full logical dump of a set of tables
pub trait Dumper {
    fn dump(&self, tables: &[&str], destination: &Path) -> Result<(), DumpError>;
}

/// `mysqldump`-based dumper
pub struct MysqldumpDumper {
    program: String,
    settings: Database,
}

impl MysqldumpDumper {
    pub fn new(settings: Database) -> Self {
        MysqldumpDumper {
            program: "mysqldump".to_string(),
            settings,
        }
    }

    /// Use a different executable (a wrapper script, a full path)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to the dump program, password excluded
    pub fn arguments(&self, tables: &[&str]) -> Vec<String> {
        let mut args = vec![
            format!("--host={}", self.settings.host),
            format!("--port={}", self.settings.port),
            format!("--user={}", self.settings.user),
            "--single-transaction".to_string(),
            self.settings.name.clone(),
        ];
        args.extend(tables.iter().map(|t| t.to_string()));
        args
    }
}

impl Dumper for MysqldumpDumper {
    fn dump(&self, tables: &[&str], destination: &Path) -> Result<(), DumpError> {
        let io_err = |source| DumpError::Io {
            path: destination.to_path_buf(),
            source,
        };
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let partial = destination.with_extension("sql.partial");
        let out = File::create(&partial).map_err(io_err)?;

        info!(program = %self.program, tables = ?tables, path = %destination.display(), "dumping tables");
        let mut command = Command::new(&self.program);
        command
            .args(self.arguments(tables))
            .stdout(Stdio::from(out))
            .stderr(Stdio::piped());
        if !self.settings.password.is_empty() {
            command.env("MYSQL_PWD", &self.settings.password);
        }

        let output = command.output().map_err(|source| {
            let _ = fs::remove_file(&partial);
            DumpError::Spawn {
                program: self.program.clone(),
                source,
            }
        })?;
        if !output.status.success() {
            let _ = fs::remove_file(&partial);
            return Err(DumpError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        fs::rename(&partial, destination).map_err(io_err)?;
        info!(path = %destination.display(), "dump written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dumper() -> MysqldumpDumper {
        let mut settings = Database::default();
        settings.password = "secret".to_string();
        MysqldumpDumper::new(settings)
    }

    #[test]
    fn test_arguments_exclude_password() {
        let args = dumper().arguments(&["pubmed_cid_synonym_filtered", "pubmed_cid_smiles"]);
        assert!(args.iter().all(|a| !a.contains("secret")));
        assert_eq!(
            &args[args.len() - 3..],
            &["pubchem", "pubmed_cid_synonym_filtered", "pubmed_cid_smiles"]
        );
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pubchem_data.sql");
        let err = dumper()
            .with_program("/nonexistent/mysqldump")
            .dump(&["t"], &dest)
            .unwrap_err();
        assert!(matches!(err, DumpError::Spawn { .. }));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_leaves_no_dump() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pubchem_data.sql");
        let err = dumper().with_program("false").dump(&["t"], &dest).unwrap_err();
        assert!(matches!(err, DumpError::Failed { .. }));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_program_output_lands_at_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("pubchem_data.sql");
        // `echo` prints its arguments, standing in for the dump text
        dumper().with_program("echo").dump(&["t"], &dest).unwrap();
        let text = fs::read_to_string(&dest).unwrap();
        assert!(text.contains("--single-transaction"));
        assert!(text.trim_end().ends_with("pubchem t"));
    }
}
