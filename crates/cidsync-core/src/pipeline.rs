//! Refresh pipeline — sequences the stages of one batch run
//!
//! ```text
//! fetch → normalize → (backup) → truncate → load → (cleanup)
//! ```
//!
//! Each stage reports an [`Outcome`]. Fetch and normalize failures always
//! stop the run, since nothing downstream has an input without them. Backup
//! and database failures follow the configured [`FailurePolicy`].
//!
//! # Guarantees
//!
//! - A stage marker is written only after the stage succeeds.
//! - A fresh download invalidates the markers of everything derived from it.
//! - Normalization never appends to output left over from an interrupted run.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::backup::Dumper;
use crate::checkpoint::{sha256_file, Checkpoint, CheckpointStore, Stage};
use crate::config::{Config, FailurePolicy};
use crate::fetch::{ensure_local, Fetcher};
use crate::normalizer::{NormalizeSummary, Normalizer};
use crate::store::TableStore;
use crate::{Error, Result};

/// Result of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum Outcome {
    Completed(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Stage-by-stage record of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        !self
            .stages
            .iter()
            .any(|s| matches!(s.outcome, Outcome::Failed(_)))
    }

    /// Append a stage result; returns whether the run should go on
    fn record(&mut self, stage: impl Into<String>, result: Result<Outcome>, policy: FailurePolicy) -> bool {
        let stage = stage.into();
        match result {
            Ok(outcome) => {
                self.stages.push(StageReport { stage, outcome });
                true
            }
            Err(e) => {
                let message = e.to_string();
                let proceed = policy == FailurePolicy::Continue;
                if proceed {
                    warn!(stage = %stage, error = %message, "stage failed, continuing");
                } else {
                    error!(stage = %stage, error = %message, "stage failed");
                }
                self.stages.push(StageReport {
                    stage,
                    outcome: Outcome::Failed(message),
                });
                proceed
            }
        }
    }
}

type ChunkCallback<'a> = Box<dyn FnMut(&NormalizeSummary) + 'a>;

/// Driver for one refresh run
pub struct Pipeline<'a> {
    config: &'a Config,
    checkpoints: CheckpointStore,
    fetcher: &'a dyn Fetcher,
    store: &'a dyn TableStore,
    dumper: Option<&'a dyn Dumper>,
    policy: FailurePolicy,
    on_chunk: Option<ChunkCallback<'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, fetcher: &'a dyn Fetcher, store: &'a dyn TableStore) -> Self {
        Pipeline {
            config,
            checkpoints: CheckpointStore::new(config.checkpoint_dir()),
            fetcher,
            store,
            dumper: None,
            policy: config.pipeline.on_failure,
            on_chunk: None,
        }
    }

    pub fn with_dumper(mut self, dumper: &'a dyn Dumper) -> Self {
        self.dumper = Some(dumper);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Called after every normalized chunk
    pub fn with_progress(mut self, on_chunk: impl FnMut(&NormalizeSummary) + 'a) -> Self {
        self.on_chunk = Some(Box::new(on_chunk));
        self
    }

    /// Run every stage in order
    pub fn run(&mut self) -> RunReport {
        let mut report = RunReport::default();
        info!(work_dir = %self.config.work_dir.display(), "refresh started");

        let fetched = self.fetch();
        if !report.record("fetch", fetched, FailurePolicy::Halt) {
            return report;
        }
        let normalized = self.normalize();
        if !report.record("normalize", normalized, FailurePolicy::Halt) {
            return report;
        }
        if self.config.pipeline.backup {
            let backed_up = self.backup(false);
            if !report.record("backup", backed_up, self.policy) {
                return report;
            }
        }
        if !self.refresh_tables(&mut report) {
            return report;
        }
        if self.config.pipeline.cleanup {
            let cleaned = if report.succeeded() {
                self.cleanup()
            } else {
                Ok(Outcome::Skipped("an earlier stage failed".to_string()))
            };
            report.record("cleanup", cleaned, self.policy);
        }

        info!(succeeded = report.succeeded(), "refresh finished");
        report
    }

    /// Truncate and load both tables, recording into `report`
    ///
    /// Returns whether the run should go on.
    pub fn refresh_tables(&self, report: &mut RunReport) -> bool {
        refresh_tables(self.config, &self.checkpoints, self.store, self.policy, report)
    }

    // ── Stages ────────────────────────────────────────────

    /// Download both datasets unless already present
    pub fn fetch(&self) -> Result<Outcome> {
        fetch_datasets(self.config, &self.checkpoints, self.fetcher)
    }

    /// Canonicalize the SMILES dataset into the output file
    pub fn normalize(&mut self) -> Result<Outcome> {
        let output = self.config.output_path();
        if self.checkpoints.is_complete(Stage::Normalize)? {
            info!(path = %output.display(), "normalized output up to date");
            return Ok(Outcome::Skipped(format!(
                "{} already normalized",
                output.display()
            )));
        }

        if output.exists() {
            warn!(path = %output.display(), "removing output of an unfinished run");
            fs::remove_file(&output).map_err(|e| Error::io(&output, e))?;
        }

        let input = self.config.smiles_path();
        let normalizer = Normalizer::new(self.config.pipeline.chunk_size)?;
        let summary = match self.on_chunk.as_mut() {
            Some(on_chunk) => {
                normalizer.normalize_file_with_progress(&input, &output, |s| on_chunk(s))?
            }
            None => normalizer.normalize_file(&input, &output)?,
        };

        let marker = Checkpoint::for_artifact(Stage::Normalize, &output)?.with_rows(summary.rows_read);
        self.checkpoints.mark(&marker)?;
        Ok(Outcome::Completed(format!(
            "{} rows, {} canonicalized, {} failed",
            summary.rows_read, summary.canonicalized, summary.failed
        )))
    }

    /// Dump both tables unless a backup already exists (or `force`)
    pub fn backup(&self, force: bool) -> Result<Outcome> {
        match self.dumper {
            Some(dumper) => backup_tables(self.config, &self.checkpoints, dumper, force),
            None => Ok(Outcome::Skipped("no dump program configured".to_string())),
        }
    }

    /// Remove downloads and intermediate output
    pub fn cleanup(&self) -> Result<Outcome> {
        let mut removed = Vec::new();
        for path in [
            self.config.smiles_path(),
            self.config.synonym_path(),
            self.config.output_path(),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path.display().to_string()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&path, e)),
            }
        }
        for stage in [Stage::FetchSmiles, Stage::FetchSynonym, Stage::Normalize] {
            self.checkpoints.clear(stage)?;
        }
        info!(files = removed.len(), "working files removed");
        Ok(Outcome::Completed(format!("removed {} files", removed.len())))
    }
}

// ── Standalone stages ─────────────────────────────────────

/// Download whichever of the two datasets is missing
///
/// A dataset already on disk gets a marker carrying its digest, so later
/// status checks see the file that was actually used.
pub fn fetch_datasets(
    config: &Config,
    checkpoints: &CheckpointStore,
    fetcher: &dyn Fetcher,
) -> Result<Outcome> {
    let dir = &config.work_dir;
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let sources = [
        (&config.sources.smiles_url, config.smiles_path(), Stage::FetchSmiles),
        (&config.sources.synonym_url, config.synonym_path(), Stage::FetchSynonym),
    ];
    let mut downloaded = Vec::new();
    for (url, path, stage) in sources {
        match ensure_local(fetcher, url, &path)? {
            Some(fetch) => {
                let marker = Checkpoint::for_artifact(stage, &path)?.with_sha256(fetch.sha256);
                checkpoints.mark(&marker)?;
                invalidate_after(checkpoints, stage)?;
                downloaded.push(path.display().to_string());
            }
            None => {
                if checkpoints.get(stage)?.is_none() {
                    let marker =
                        Checkpoint::for_artifact(stage, &path)?.with_sha256(sha256_file(&path)?);
                    checkpoints.mark(&marker)?;
                }
            }
        }
    }

    if downloaded.is_empty() {
        Ok(Outcome::Skipped("both datasets already present".to_string()))
    } else {
        Ok(Outcome::Completed(format!("downloaded {}", downloaded.join(", "))))
    }
}

/// Clear markers of stages derived from a freshly downloaded artifact
fn invalidate_after(checkpoints: &CheckpointStore, stage: Stage) -> Result<()> {
    match stage {
        Stage::FetchSmiles => {
            checkpoints.clear(Stage::Normalize)?;
            checkpoints.clear(Stage::LoadSmiles)
        }
        Stage::FetchSynonym => checkpoints.clear(Stage::LoadSynonym),
        _ => Ok(()),
    }
}

/// Dump both tables unless a backup already exists (or `force`)
pub fn backup_tables(
    config: &Config,
    checkpoints: &CheckpointStore,
    dumper: &dyn Dumper,
    force: bool,
) -> Result<Outcome> {
    let destination = config.backup_path();
    if !force && (checkpoints.is_complete(Stage::Backup)? || destination.exists()) {
        info!(path = %destination.display(), "backup already exists");
        return Ok(Outcome::Skipped(format!(
            "{} already exists",
            destination.display()
        )));
    }

    let tables = [config.tables.synonym.as_str(), config.tables.smiles.as_str()];
    dumper.dump(&tables, &destination)?;
    checkpoints.mark(&Checkpoint::for_artifact(Stage::Backup, &destination)?)?;
    Ok(Outcome::Completed(format!("wrote {}", destination.display())))
}

/// Truncate and load both tables, recording into `report`
///
/// Returns whether the run should go on.
pub fn refresh_tables(
    config: &Config,
    checkpoints: &CheckpointStore,
    store: &dyn TableStore,
    policy: FailurePolicy,
    report: &mut RunReport,
) -> bool {
    let tables = &config.tables;
    for table in [&tables.smiles, &tables.synonym] {
        let truncated = store
            .truncate(table)
            .map(|()| Outcome::Completed("all rows removed".to_string()))
            .map_err(Error::from);
        if !report.record(format!("truncate {}", table), truncated, policy) {
            return false;
        }
    }

    let loads = [
        (&tables.smiles, config.output_path(), Stage::LoadSmiles),
        (&tables.synonym, config.synonym_path(), Stage::LoadSynonym),
    ];
    for (table, file, stage) in loads {
        let loaded = load_table(checkpoints, store, table, &file, stage);
        if !report.record(format!("load {}", table), loaded, policy) {
            return false;
        }
    }
    true
}

fn load_table(
    checkpoints: &CheckpointStore,
    store: &dyn TableStore,
    table: &str,
    file: &Path,
    stage: Stage,
) -> Result<Outcome> {
    let rows = store.bulk_load(file, table)?;
    let marker = Checkpoint::for_artifact(stage, file)?.with_rows(rows);
    checkpoints.mark(&marker)?;
    Ok(Outcome::Completed(format!("{} rows from {}", rows, file.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::DumpError;
    use crate::fetch::{write_decompressed, FetchError, FetchReport};
    use crate::store::{MemoryStore, StoreError};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::cell::{Cell, RefCell};
    use std::io::Write;
    use std::path::Path;

    const SMILES: &str = "CID001\tCCO\nCID002\tC1CC1C1\nCID003\tc1ccccc1\n";
    const SYNONYMS: &str = "1\taspirin\n2\tethanol\n";

    /// Serves fixed bodies by URL suffix
    struct FakeFetcher {
        calls: Cell<usize>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str, destination: &Path) -> std::result::Result<FetchReport, FetchError> {
            self.calls.set(self.calls.get() + 1);
            let body = if url.ends_with("CID-SMILES.gz") { SMILES } else { SYNONYMS };
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(body.as_bytes()).unwrap();
            write_decompressed(enc.finish().unwrap().as_slice(), destination)
        }
    }

    struct FailingStore;

    impl TableStore for FailingStore {
        fn truncate(&self, table: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError::Operation {
                operation: "truncate",
                table: table.to_string(),
                message: "server has gone away".to_string(),
            })
        }

        fn bulk_load(&self, _file: &Path, _table: &str) -> std::result::Result<u64, StoreError> {
            Ok(0)
        }
    }

    struct RecordingDumper {
        dumped: RefCell<Vec<String>>,
    }

    impl Dumper for RecordingDumper {
        fn dump(&self, tables: &[&str], destination: &Path) -> std::result::Result<(), DumpError> {
            self.dumped.borrow_mut().extend(tables.iter().map(|t| t.to_string()));
            fs::create_dir_all(destination.parent().unwrap()).unwrap();
            fs::write(destination, "-- dump\n").unwrap();
            Ok(())
        }
    }

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.work_dir = dir.join("data");
        config.backup_dir = dir.join("backup");
        config
    }

    #[test]
    fn test_full_run_with_memory_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let fetcher = FakeFetcher { calls: Cell::new(0) };
        let store = MemoryStore::new();

        let report = Pipeline::new(&config, &fetcher, &store).run();

        assert!(report.succeeded(), "{:?}", report);
        assert_eq!(fetcher.calls.get(), 2);
        assert_eq!(store.row_count("pubmed_cid_smiles"), 3);
        assert_eq!(store.row_count("pubmed_cid_synonym_filtered"), 2);
        let rows = store.rows("pubmed_cid_smiles");
        assert_eq!(rows[0], vec!["CID001", "CCO", "CCO"]);
        assert_eq!(rows[1], vec!["CID002", "C1CC1C1", ""]);
        assert_eq!(rows[2], vec!["CID003", "c1ccccc1", "c1ccccc1"]);
    }

    #[test]
    fn test_second_run_skips_fetch_and_normalize() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let fetcher = FakeFetcher { calls: Cell::new(0) };
        let store = MemoryStore::new();

        Pipeline::new(&config, &fetcher, &store).run();
        let report = Pipeline::new(&config, &fetcher, &store).run();

        assert_eq!(fetcher.calls.get(), 2);
        assert!(matches!(report.stages[0].outcome, Outcome::Skipped(_)));
        assert!(matches!(report.stages[1].outcome, Outcome::Skipped(_)));
        // Truncate-then-load leaves the same row count, not double
        assert_eq!(store.row_count("pubmed_cid_smiles"), 3);
    }

    #[test]
    fn test_stale_output_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(&config.work_dir).unwrap();
        fs::write(config.output_path(), "CID001\tCCO\tCCO\n").unwrap();
        let fetcher = FakeFetcher { calls: Cell::new(0) };
        let store = MemoryStore::new();

        Pipeline::new(&config, &fetcher, &store).run();

        let text = fs::read_to_string(config.output_path()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_store_failure_halts_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let fetcher = FakeFetcher { calls: Cell::new(0) };

        let report = Pipeline::new(&config, &fetcher, &FailingStore).run();

        assert!(!report.succeeded());
        let last = report.stages.last().unwrap();
        assert_eq!(last.stage, "truncate pubmed_cid_smiles");
        assert!(matches!(last.outcome, Outcome::Failed(_)));
    }

    #[test]
    fn test_store_failure_continues_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let fetcher = FakeFetcher { calls: Cell::new(0) };

        let report = Pipeline::new(&config, &fetcher, &FailingStore)
            .with_policy(FailurePolicy::Continue)
            .run();

        assert!(!report.succeeded());
        let names: Vec<&str> = report.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "fetch",
                "normalize",
                "truncate pubmed_cid_smiles",
                "truncate pubmed_cid_synonym_filtered",
                "load pubmed_cid_smiles",
                "load pubmed_cid_synonym_filtered",
            ]
        );
    }

    #[test]
    fn test_backup_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.pipeline.backup = true;
        let fetcher = FakeFetcher { calls: Cell::new(0) };
        let store = MemoryStore::new();
        let dumper = RecordingDumper {
            dumped: RefCell::new(Vec::new()),
        };

        Pipeline::new(&config, &fetcher, &store).with_dumper(&dumper).run();
        let report = Pipeline::new(&config, &fetcher, &store).with_dumper(&dumper).run();

        assert_eq!(
            *dumper.dumped.borrow(),
            vec!["pubmed_cid_synonym_filtered", "pubmed_cid_smiles"]
        );
        assert!(matches!(report.stages[2].outcome, Outcome::Skipped(_)));
        assert!(config.backup_path().exists());
    }

    #[test]
    fn test_cleanup_removes_working_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.pipeline.cleanup = true;
        let fetcher = FakeFetcher { calls: Cell::new(0) };
        let store = MemoryStore::new();

        let report = Pipeline::new(&config, &fetcher, &store).run();

        assert!(report.succeeded());
        assert!(!config.smiles_path().exists());
        assert!(!config.synonym_path().exists());
        assert!(!config.output_path().exists());
        let checkpoints = CheckpointStore::new(config.checkpoint_dir());
        assert_eq!(checkpoints.get(Stage::Normalize).unwrap(), None);
        assert!(checkpoints.get(Stage::LoadSmiles).unwrap().is_some());
    }

    #[test]
    fn test_progress_callback_sees_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.pipeline.chunk_size = 2;
        let fetcher = FakeFetcher { calls: Cell::new(0) };
        let store = MemoryStore::new();
        let mut last = 0;

        Pipeline::new(&config, &fetcher, &store)
            .with_progress(|s: &NormalizeSummary| last = s.rows_read)
            .run();

        assert_eq!(last, 3);
    }

    #[test]
    fn test_present_dataset_marked_with_digest() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(&config.work_dir).unwrap();
        fs::write(config.smiles_path(), "abc").unwrap();
        let checkpoints = CheckpointStore::new(config.checkpoint_dir());
        let fetcher = FakeFetcher { calls: Cell::new(0) };

        let outcome = fetch_datasets(&config, &checkpoints, &fetcher).unwrap();

        assert!(matches!(outcome, Outcome::Completed(_)));
        assert_eq!(fetcher.calls.get(), 1);
        let marker = checkpoints.get(Stage::FetchSmiles).unwrap().unwrap();
        assert_eq!(
            marker.sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_fetch_failure_is_an_error() {
        struct Unreachable;
        impl Fetcher for Unreachable {
            fn fetch(&self, url: &str, _destination: &Path) -> std::result::Result<FetchReport, FetchError> {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                })
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let checkpoints = CheckpointStore::new(config.checkpoint_dir());

        let err = fetch_datasets(&config, &checkpoints, &Unreachable).unwrap_err();

        assert!(matches!(err, Error::Fetch(_)));
        assert_eq!(checkpoints.get(Stage::FetchSmiles).unwrap(), None);
    }

    #[test]
    fn test_backup_tables_without_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let checkpoints = CheckpointStore::new(config.checkpoint_dir());
        let dumper = RecordingDumper {
            dumped: RefCell::new(Vec::new()),
        };

        let first = backup_tables(&config, &checkpoints, &dumper, false).unwrap();
        let second = backup_tables(&config, &checkpoints, &dumper, false).unwrap();
        let forced = backup_tables(&config, &checkpoints, &dumper, true).unwrap();

        assert!(matches!(first, Outcome::Completed(_)));
        assert!(matches!(second, Outcome::Skipped(_)));
        assert!(matches!(forced, Outcome::Completed(_)));
        assert_eq!(dumper.dumped.borrow().len(), 4);
    }

    #[test]
    fn test_report_serializes_with_status() {
        let report = RunReport {
            stages: vec![StageReport {
                stage: "fetch".to_string(),
                outcome: Outcome::Skipped("present".to_string()),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stages"][0]["stage"], "fetch");
        assert_eq!(json["stages"][0]["status"], "skipped");
        assert_eq!(json["stages"][0]["detail"], "present");
    }
}
