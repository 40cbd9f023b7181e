//! Stage checkpoints — persisted completion markers
//!
//! A marker is written only after its stage succeeds. It records the artifact
//! the stage produced and that artifact's size, so a file that exists but does
//! not match its marker (a truncated download, a half-written dump) is not
//! mistaken for a finished stage.
//!
//! Markers live in `<work_dir>/.cidsync/<stage>.json`.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Pipeline stages that leave a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchSmiles,
    FetchSynonym,
    Normalize,
    Backup,
    LoadSmiles,
    LoadSynonym,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::FetchSmiles,
        Stage::FetchSynonym,
        Stage::Normalize,
        Stage::Backup,
        Stage::LoadSmiles,
        Stage::LoadSynonym,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::FetchSmiles => "fetch_smiles",
            Stage::FetchSynonym => "fetch_synonym",
            Stage::Normalize => "normalize",
            Stage::Backup => "backup",
            Stage::LoadSmiles => "load_smiles",
            Stage::LoadSynonym => "load_synonym",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contents of one marker file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: Stage,
    pub artifact: PathBuf,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Seconds since the Unix epoch
    pub completed_at: u64,
    /// Rows loaded, for load stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
}

impl Checkpoint {
    /// Marker for `artifact` as it currently exists on disk
    pub fn for_artifact(stage: Stage, artifact: &Path) -> Result<Self> {
        let size = fs::metadata(artifact)
            .map_err(|e| Error::io(artifact, e))?
            .len();
        Ok(Checkpoint {
            stage,
            artifact: artifact.to_path_buf(),
            size,
            sha256: None,
            completed_at: now_secs(),
            rows: None,
        })
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Whether the recorded artifact still exists with the recorded size
    pub fn artifact_matches(&self) -> bool {
        fs::metadata(&self.artifact).map_or(false, |m| m.len() == self.size)
    }
}

/// Reads and writes markers under one directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointStore { dir: dir.into() }
    }

    fn path(&self, stage: Stage) -> PathBuf {
        self.dir.join(format!("{}.json", stage.name()))
    }

    /// Read a marker; `None` if the stage never completed
    pub fn get(&self, stage: Stage) -> Result<Option<Checkpoint>> {
        let path = self.path(stage);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };
        let checkpoint: Checkpoint = serde_json::from_str(&text).map_err(|e| {
            Error::Checkpoint(format!("corrupt marker {}: {}", path.display(), e))
        })?;
        if checkpoint.stage != stage {
            return Err(Error::Checkpoint(format!(
                "marker {} belongs to stage {}",
                path.display(),
                checkpoint.stage
            )));
        }
        Ok(Some(checkpoint))
    }

    /// Whether `stage` completed and its artifact is unchanged in size
    pub fn is_complete(&self, stage: Stage) -> Result<bool> {
        Ok(self.get(stage)?.map_or(false, |c| c.artifact_matches()))
    }

    /// Persist a marker atomically (write to a temp file, then rename)
    pub fn mark(&self, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.path(checkpoint.stage);
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| Error::Checkpoint(format!("cannot encode marker: {}", e)))?;
        fs::write(&tmp, text).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;
        Ok(())
    }

    /// Remove a marker if present
    pub fn clear(&self, stage: Stage) -> Result<()> {
        let path = self.path(stage);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

/// SHA-256 hex digest of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
