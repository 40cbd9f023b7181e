//! Run configuration
//!
//! One `Config` is built at start-up and passed by reference to every stage.
//! Every field has a default, so an empty TOML document is a valid config.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::normalizer::DEFAULT_CHUNK_SIZE;
use crate::{Error, Result};

/// Environment variable that overrides `database.password`
pub const PASSWORD_ENV: &str = "CIDSYNC_DB_PASSWORD";

const PUBCHEM_EXTRAS: &str = "https://ftp.ncbi.nlm.nih.gov/pubchem/Compound/Extras";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Downloads, intermediate output and checkpoint markers
    pub work_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub sources: Sources,
    pub files: Files,
    pub database: Database,
    pub tables: Tables,
    pub pipeline: PipelineOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sources {
    pub smiles_url: String,
    pub synonym_url: String,
}

/// File names, relative to `work_dir` (`backup` is relative to `backup_dir`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Files {
    pub smiles: String,
    pub synonym: String,
    pub output: String,
    pub backup: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Database {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    /// Executable used for backups
    pub dump_program: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tables {
    pub smiles: String,
    pub synonym: String,
}

/// What the driver does when a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Halt,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub backup: bool,
    pub cleanup: bool,
    pub on_failure: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            work_dir: PathBuf::from("data"),
            backup_dir: PathBuf::from("backup"),
            sources: Sources::default(),
            files: Files::default(),
            database: Database::default(),
            tables: Tables::default(),
            pipeline: PipelineOptions::default(),
        }
    }
}

impl Default for Sources {
    fn default() -> Self {
        Sources {
            smiles_url: format!("{}/CID-SMILES.gz", PUBCHEM_EXTRAS),
            synonym_url: format!("{}/CID-Synonym-filtered.gz", PUBCHEM_EXTRAS),
        }
    }
}

impl Default for Files {
    fn default() -> Self {
        Files {
            smiles: "CID-SMILES".to_string(),
            synonym: "CID-Synonym-filtered".to_string(),
            output: "pubchem_rdkit_smiles.tsv".to_string(),
            backup: "pubchem_data.sql".to_string(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Database {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            name: "pubchem".to_string(),
            dump_program: "mysqldump".to_string(),
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Tables {
            smiles: "pubmed_cid_smiles".to_string(),
            synonym: "pubmed_cid_synonym_filtered".to_string(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            backup: false,
            cleanup: false,
            on_failure: FailurePolicy::Halt,
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when `path` is `None`
    ///
    /// The password environment override is applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
                Self::from_toml(&text)?
            }
            None => Config::default(),
        };
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.database.password = password;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without consulting the environment
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.chunk_size == 0 {
            return Err(Error::Config(
                "pipeline.chunk_size must be greater than 0".to_string(),
            ));
        }
        for (key, value) in [
            ("tables.smiles", &self.tables.smiles),
            ("tables.synonym", &self.tables.synonym),
        ] {
            if !is_identifier(value) {
                return Err(Error::Config(format!(
                    "{} must be a plain table name, got '{}'",
                    key, value
                )));
            }
        }
        for (key, value) in [
            ("database.dump_program", &self.database.dump_program),
            ("files.smiles", &self.files.smiles),
            ("files.synonym", &self.files.synonym),
            ("files.output", &self.files.output),
            ("files.backup", &self.files.backup),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }

    pub fn smiles_path(&self) -> PathBuf {
        self.work_dir.join(&self.files.smiles)
    }

    pub fn synonym_path(&self) -> PathBuf {
        self.work_dir.join(&self.files.synonym)
    }

    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.files.output)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.backup_dir.join(&self.files.backup)
    }

    /// Directory holding checkpoint markers
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.work_dir.join(".cidsync")
    }

    /// Effective configuration as TOML, password redacted
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if !shown.database.password.is_empty() {
            shown.database.password = "********".to_string();
        }
        toml::to_string_pretty(&shown)
            .map_err(|e| Error::Config(format!("cannot render configuration: {}", e)))
    }
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_]` is allowed
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
