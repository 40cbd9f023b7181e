//! Integration tests for the cidsync CLI
//!
//! These tests invoke the actual cidsync-cli binary and verify:
//! - Exit codes (0 = success, 1 = stage or structure failure, 2 = error)
//! - stdout/stderr output
//! - JSON output format
//! - Offline commands work end-to-end (no network, no database)

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

// ── Helpers ───────────────────────────────────────────────

fn cidsync_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cidsync-cli"))
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(format!("../../tests/fixtures/{}", name))
}

fn run_cidsync(args: &[&str]) -> std::process::Output {
    Command::new(cidsync_bin())
        .args(args)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .env_remove("CIDSYNC_DB_PASSWORD")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute cidsync-cli")
}

/// Working directory pre-seeded with both datasets, so no download happens
fn seeded_workspace(dir: &Path) -> PathBuf {
    let work_dir = dir.join("data");
    fs::create_dir_all(&work_dir).unwrap();
    fs::copy(fixture("cid-smiles-sample.tsv"), work_dir.join("CID-SMILES")).unwrap();
    fs::copy(
        fixture("cid-synonym-sample.tsv"),
        work_dir.join("CID-Synonym-filtered"),
    )
    .unwrap();

    let config = dir.join("cidsync.toml");
    fs::write(
        &config,
        format!(
            "work_dir = {:?}\nbackup_dir = {:?}\n\n[pipeline]\nchunk_size = 4\n",
            work_dir.display().to_string(),
            dir.join("backup").display().to_string()
        ),
    )
    .unwrap();
    config
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

// ── Version ───────────────────────────────────────────────

#[test]
fn test_version_command() {
    let output = run_cidsync(&["version"]);
    assert!(output.status.success(), "version should exit 0");
    let stdout = stdout_of(&output);
    assert!(stdout.contains("cidsync"), "should contain 'cidsync'");
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "should contain version"
    );
}

#[test]
fn test_version_flag() {
    let output = run_cidsync(&["--version"]);
    assert!(output.status.success(), "--version should exit 0");
    assert!(stdout_of(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_command_is_usage_error() {
    let output = run_cidsync(&["frobnicate"]);
    assert_eq!(output.status.code(), Some(2));
}

// ── Canon ─────────────────────────────────────────────────

#[test]
fn test_canon_single() {
    let output = run_cidsync(&["canon", "OCC"]);
    assert!(output.status.success());
    assert_eq!(stdout_of(&output).trim(), "CCO");
}

#[test]
fn test_canon_several_in_order() {
    let output = run_cidsync(&["canon", "OC(=O)C", "C1=CC=CC=C1"]);
    assert!(output.status.success());
    let lines: Vec<String> = stdout_of(&output).lines().map(String::from).collect();
    assert_eq!(lines, vec!["CC(=O)O", "c1ccccc1"]);
}

#[test]
fn test_canon_invalid_exits_1() {
    let output = run_cidsync(&["canon", "C1CC1C1"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("C1CC1C1"), "should name the failing input");
}

#[test]
fn test_canon_json_output() {
    let output = run_cidsync(&["canon", "--json", "OCC", "C(C"]);
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value =
        serde_json::from_str(&stdout_of(&output)).expect("should be valid JSON");
    assert_eq!(json[0]["input"], "OCC");
    assert_eq!(json[0]["canonical"], "CCO");
    assert!(json[0]["error"].is_null());
    assert!(json[1]["canonical"].is_null());
    assert!(json[1]["error"].is_string());
}

#[test]
fn test_canon_requires_an_argument() {
    let output = run_cidsync(&["canon"]);
    assert_eq!(output.status.code(), Some(2));
}

// ── Normalize ─────────────────────────────────────────────

#[test]
fn test_normalize_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("pubchem_rdkit_smiles.tsv");
    let output = run_cidsync(&[
        "normalize",
        fixture("cid-smiles-sample.tsv").to_str().unwrap(),
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "normalize should exit 0");

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6, "one output row per input row");
    assert!(lines[0].starts_with("1\tCC(=O)OC1=CC=CC=C1C(=O)O\t"));
    assert!(!lines[0].ends_with('\t'), "aspirin should canonicalize");
    assert_eq!(lines[1], "2\tOCC\tCCO");
    assert_eq!(lines[2], "3\tC1CC1C1\t");
    assert_eq!(lines[3], "4\tc1ccccc1\tc1ccccc1");
    assert_eq!(lines[4], "5\tOC(=O)C\tCC(=O)O");
    assert_eq!(lines[5], "6\t[Na+].[Cl-]\t[Na+].[Cl-]");
}

#[test]
fn test_normalize_json_summary() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.tsv");
    let output = run_cidsync(&[
        "normalize",
        "--json",
        "--chunk-size",
        "4",
        fixture("cid-smiles-sample.tsv").to_str().unwrap(),
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_str(&stdout_of(&output)).expect("should be valid JSON");
    assert_eq!(json["rows_read"], 6);
    assert_eq!(json["canonicalized"], 5);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["chunks"], 2);
}

#[test]
fn test_normalize_replaces_unless_append() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.tsv");
    let input = fixture("cid-smiles-sample.tsv");
    let args = ["normalize", input.to_str().unwrap(), out.to_str().unwrap()];

    run_cidsync(&args);
    run_cidsync(&args);
    assert_eq!(fs::read_to_string(&out).unwrap().lines().count(), 6);

    let mut appending = args.to_vec();
    appending.push("--append");
    run_cidsync(&appending);
    assert_eq!(fs::read_to_string(&out).unwrap().lines().count(), 12);
}

#[test]
fn test_normalize_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.tsv");
    fs::write(&out, "keep me\n").unwrap();
    let output = run_cidsync(&["normalize", "/nonexistent/CID-SMILES", out.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(fs::read_to_string(&out).unwrap(), "keep me\n");
}

#[test]
fn test_normalize_zero_chunk_size() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.tsv");
    let output = run_cidsync(&[
        "normalize",
        "--chunk-size",
        "0",
        fixture("cid-smiles-sample.tsv").to_str().unwrap(),
        out.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
}

// ── Config ────────────────────────────────────────────────

#[test]
fn test_config_redacts_password() {
    let output = run_cidsync(&["--config", fixture("cidsync.toml").to_str().unwrap(), "config"]);
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("db.internal"));
    assert!(stdout.contains("chunk_size = 500"));
    assert!(!stdout.contains("hunter2"), "password must not be printed");
    assert!(stdout.contains("********"));
}

#[test]
fn test_config_defaults() {
    let output = run_cidsync(&["config"]);
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("pubmed_cid_smiles"));
    assert!(stdout.contains("pubchem_rdkit_smiles.tsv"));
    assert!(stdout.contains("chunk_size = 100"));
}

#[test]
fn test_invalid_configs_exit_2() {
    for name in [
        "invalid-chunk-size.toml",
        "invalid-table-name.toml",
        "does-not-exist.toml",
    ] {
        let output = run_cidsync(&["--config", fixture(name).to_str().unwrap(), "config"]);
        assert_eq!(output.status.code(), Some(2), "{}", name);
    }
}

// ── Run / Status ──────────────────────────────────────────

#[test]
fn test_dry_run_with_local_datasets() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded_workspace(dir.path());

    let output = run_cidsync(&[
        "--config",
        config.to_str().unwrap(),
        "run",
        "--dry-run",
        "--json",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value =
        serde_json::from_str(&stdout_of(&output)).expect("should be valid JSON");
    let stages = json["stages"].as_array().unwrap();
    assert_eq!(stages[0]["stage"], "fetch");
    assert_eq!(stages[0]["status"], "skipped");
    assert_eq!(stages[1]["stage"], "normalize");
    assert_eq!(stages[1]["status"], "completed");
    let load = stages
        .iter()
        .find(|s| s["stage"] == "load pubmed_cid_smiles")
        .unwrap();
    assert_eq!(load["detail"].as_str().unwrap().split(' ').next(), Some("6"));

    let normalized = dir.path().join("data").join("pubchem_rdkit_smiles.tsv");
    assert_eq!(fs::read_to_string(normalized).unwrap().lines().count(), 6);
}

#[test]
fn test_status_after_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded_workspace(dir.path());
    run_cidsync(&["--config", config.to_str().unwrap(), "run", "--dry-run", "--json"]);

    let output = run_cidsync(&["--config", config.to_str().unwrap(), "status", "--json"]);
    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_str(&stdout_of(&output)).expect("should be valid JSON");
    let state = |name: &str| {
        json.as_array()
            .unwrap()
            .iter()
            .find(|s| s["stage"] == name)
            .map(|s| s["state"].as_str().unwrap().to_string())
            .unwrap()
    };
    assert_eq!(state("normalize"), "complete");
    assert_eq!(state("load_smiles"), "complete");
    assert_eq!(state("backup"), "pending");
}

#[test]
fn test_status_empty_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("cidsync.toml");
    fs::write(
        &config,
        format!("work_dir = {:?}\n", dir.path().join("data").display().to_string()),
    )
    .unwrap();

    let output = run_cidsync(&["--config", config.to_str().unwrap(), "status"]);
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert_eq!(stdout.matches("pending").count(), 6);
}

// ── Single stages ───────────────────────────────────────

#[test]
fn test_fetch_with_datasets_present_skips() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded_workspace(dir.path());

    let output = run_cidsync(&["--config", config.to_str().unwrap(), "fetch"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout_of(&output).contains("already present"));
}

#[test]
fn test_fetch_failure_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("cidsync.toml");
    fs::write(
        &config,
        format!(
            concat!(
                "work_dir = {:?}\n\n[sources]\n",
                "smiles_url = \"http://127.0.0.1:9/CID-SMILES.gz\"\n",
                "synonym_url = \"http://127.0.0.1:9/CID-Synonym-filtered.gz\"\n",
            ),
            dir.path().join("data").display().to_string()
        ),
    )
    .unwrap();

    let output = run_cidsync(&["--config", config.to_str().unwrap(), "fetch"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_of(&output).contains("fetch"));
}

#[test]
fn test_backup_failure_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded_workspace(dir.path());
    let mut text = fs::read_to_string(&config).unwrap();
    text.push_str("\n[database]\ndump_program = \"/nonexistent/mysqldump\"\n");
    fs::write(&config, text).unwrap();

    let output = run_cidsync(&["--config", config.to_str().unwrap(), "backup"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!dir.path().join("backup").join("pubchem_data.sql").exists());
}

#[test]
fn test_normalize_determinism_100_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.tsv");
    let input = fixture("cid-smiles-sample.tsv");

    run_cidsync(&["normalize", input.to_str().unwrap(), out.to_str().unwrap()]);
    let first = fs::read(&out).unwrap();
    for i in 0..100 {
        run_cidsync(&["normalize", input.to_str().unwrap(), out.to_str().unwrap()]);
        assert_eq!(fs::read(&out).unwrap(), first, "iteration {}", i);
    }
}
