use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cidsync_core::backup::MysqldumpDumper;
use cidsync_core::checkpoint::{CheckpointStore, Stage};
use cidsync_core::config::FailurePolicy;
use cidsync_core::fetch::HttpFetcher;
use cidsync_core::store::{MemoryStore, MysqlStore, TableStore};
use cidsync_core::pipeline::{backup_tables, fetch_datasets, refresh_tables};
use cidsync_core::{canonicalize, Config, Normalizer, Outcome, Pipeline, RunReport};

mod progress;

use progress::Progress;

/// cidsync — PubChem compound refresh
///
/// Download PubChem CID-SMILES and CID-Synonym-filtered, canonicalize every
/// structure, and reload the compound tables.
#[derive(Parser)]
#[command(name = "cidsync", version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole refresh: fetch, normalize, backup, truncate, load, cleanup
    Run {
        /// Keep going after a backup or database failure
        #[arg(long)]
        keep_going: bool,
        /// Load into an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
        /// Output the stage report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Canonicalize a CID-SMILES file into a three-column TSV
    Normalize {
        /// Tab-separated input (id, SMILES)
        input: PathBuf,
        /// Output file (id, SMILES, canonical SMILES)
        output: PathBuf,
        /// Rows per chunk
        #[arg(long, default_value_t = cidsync_core::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Append to an existing output instead of replacing it
        #[arg(long)]
        append: bool,
        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Canonicalize SMILES given on the command line
    Canon {
        /// One or more SMILES strings
        #[arg(required = true)]
        smiles: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download the datasets that are not present yet
    Fetch,

    /// Truncate and reload both tables from the working files
    Load {
        /// Keep going after a database failure
        #[arg(long)]
        keep_going: bool,
    },

    /// Dump both tables with mysqldump
    Backup {
        /// Overwrite an existing backup
        #[arg(long)]
        force: bool,
    },

    /// Show completed stages
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration (password redacted)
    Config,

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let exit_code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            2
        }
    };

    process::exit(exit_code);
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Exit code 0 on success, 1 when a stage or structure failed
fn dispatch(cli: Cli) -> Result<i32> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            keep_going,
            dry_run,
            json,
        } => {
            let config = load_config(config_path)?;
            let report = run(&config, keep_going, dry_run, !json && !cli.quiet)?;
            print_report(&report, json)?;
            Ok(if report.succeeded() { 0 } else { 1 })
        }
        Commands::Normalize {
            input,
            output,
            chunk_size,
            append,
            json,
        } => normalize(&input, &output, chunk_size, append, json),
        Commands::Canon { smiles, json } => canon(&smiles, json),
        Commands::Fetch => {
            let config = load_config(config_path)?;
            let checkpoints = CheckpointStore::new(config.checkpoint_dir());
            let fetched = HttpFetcher::new()
                .map_err(cidsync_core::Error::from)
                .and_then(|fetcher| fetch_datasets(&config, &checkpoints, &fetcher));
            Ok(stage_exit("fetch", fetched))
        }
        Commands::Load { keep_going } => {
            let config = load_config(config_path)?;
            let checkpoints = CheckpointStore::new(config.checkpoint_dir());
            let store = MysqlStore::new(config.database.clone());
            let mut report = RunReport::default();
            refresh_tables(
                &config,
                &checkpoints,
                &store,
                policy(&config, keep_going),
                &mut report,
            );
            print_report(&report, false)?;
            Ok(if report.succeeded() { 0 } else { 1 })
        }
        Commands::Backup { force } => {
            let config = load_config(config_path)?;
            let checkpoints = CheckpointStore::new(config.checkpoint_dir());
            let backed_up = backup_tables(&config, &checkpoints, &dumper_for(&config), force);
            Ok(stage_exit("backup", backed_up))
        }
        Commands::Status { json } => {
            let config = load_config(config_path)?;
            status(&config, json)
        }
        Commands::Config => {
            let config = load_config(config_path)?;
            print!("{}", config.to_redacted_toml()?);
            Ok(0)
        }
        Commands::Version => {
            println!(
                "cidsync {} (cidsync-core {})",
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_VERSION")
            );
            Ok(0)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path)?;
    debug!(
        path = %path.map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string()),
        work_dir = %config.work_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}

fn dumper_for(config: &Config) -> MysqldumpDumper {
    MysqldumpDumper::new(config.database.clone()).with_program(&config.database.dump_program)
}

fn policy(config: &Config, keep_going: bool) -> FailurePolicy {
    if keep_going {
        FailurePolicy::Continue
    } else {
        config.pipeline.on_failure
    }
}

// ── Commands ──────────────────────────────────────────────

fn run(config: &Config, keep_going: bool, dry_run: bool, show_progress: bool) -> Result<RunReport> {
    let fetcher = HttpFetcher::new()?;
    let dumper = dumper_for(config);
    let memory;
    let mysql;
    let store: &dyn TableStore = if dry_run {
        debug!("dry run: loading into memory");
        memory = MemoryStore::new();
        &memory
    } else {
        mysql = MysqlStore::new(config.database.clone());
        &mysql
    };

    let mut progress = Progress::new(show_progress && io::stderr().is_terminal(), "refreshing");
    let report = {
        let mut pipeline = Pipeline::new(config, &fetcher, store)
            .with_policy(policy(config, keep_going))
            .with_progress(|s| progress.update(s));
        if !dry_run {
            pipeline = pipeline.with_dumper(&dumper);
        }
        pipeline.run()
    };
    progress.finish();
    Ok(report)
}

fn normalize(input: &Path, output: &Path, chunk_size: usize, append: bool, json: bool) -> Result<i32> {
    let normalizer = Normalizer::new(chunk_size)?;
    anyhow::ensure!(input.is_file(), "input {} does not exist", input.display());
    if !append && output.exists() {
        fs::remove_file(output).with_context(|| format!("cannot replace {}", output.display()))?;
    }
    let summary = normalizer.normalize_file(input, output)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} {} rows ({} canonicalized, {} failed) → {}",
            "✓".green(),
            summary.rows_read,
            summary.canonicalized,
            summary.failed,
            output.display()
        );
    }
    Ok(0)
}

fn canon(inputs: &[String], json: bool) -> Result<i32> {
    let results: Vec<_> = inputs.iter().map(|s| (s, canonicalize(s))).collect();
    let all_ok = results.iter().all(|(_, r)| r.is_ok());

    if json {
        let items: Vec<_> = results
            .iter()
            .map(|(input, result)| match result {
                Ok(canonical) => serde_json::json!({
                    "input": input,
                    "canonical": canonical,
                    "error": null,
                }),
                Err(e) => serde_json::json!({
                    "input": input,
                    "canonical": null,
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for (input, result) in &results {
            match result {
                Ok(canonical) => println!("{}", canonical),
                Err(e) => eprintln!("{} {}: {}", "✗".red(), input, e),
            }
        }
    }
    Ok(if all_ok { 0 } else { 1 })
}

fn status(config: &Config, json: bool) -> Result<i32> {
    let store = CheckpointStore::new(config.checkpoint_dir());
    let mut rows = Vec::new();
    for stage in Stage::ALL {
        let marker = store.get(stage)?;
        let state = match &marker {
            None => "pending",
            Some(c) if c.artifact_matches() => "complete",
            Some(_) => "changed",
        };
        rows.push((stage, state, marker));
    }

    if json {
        let items: Vec<_> = rows
            .iter()
            .map(|(stage, state, marker)| {
                serde_json::json!({
                    "stage": stage.name(),
                    "state": state,
                    "artifact": marker.as_ref().map(|c| c.artifact.display().to_string()),
                    "rows": marker.as_ref().and_then(|c| c.rows),
                    "completed_at": marker.as_ref().map(|c| c.completed_at),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for (stage, state, marker) in &rows {
            let mark = match *state {
                "complete" => "✓".green(),
                "changed" => "!".yellow(),
                _ => "·".dimmed(),
            };
            let detail = marker
                .as_ref()
                .map(|c| c.artifact.display().to_string())
                .unwrap_or_default();
            println!("  {} {:<14} {:<9} {}", mark, stage.name(), state, detail.as_str().dimmed());
        }
    }
    Ok(0)
}

// ── Output ────────────────────────────────────────────────

fn print_outcome(stage: &str, outcome: &Outcome) {
    let (mark, detail) = match outcome {
        Outcome::Completed(d) => ("✓".green(), d),
        Outcome::Skipped(d) => ("·".dimmed(), d),
        Outcome::Failed(d) => ("✗".red(), d),
    };
    println!("  {} {:<40} {}", mark, stage, detail);
}

/// Print a single stage result; 1 when it failed
fn stage_exit(stage: &str, result: cidsync_core::Result<Outcome>) -> i32 {
    let outcome =
        result.unwrap_or_else(|e| Outcome::Failed(format!("{:#}", anyhow::Error::from(e))));
    print_outcome(stage, &outcome);
    match outcome {
        Outcome::Failed(_) => 1,
        _ => 0,
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for stage in &report.stages {
        print_outcome(&stage.stage, &stage.outcome);
    }
    if report.succeeded() {
        println!("{} refresh complete", "✓".green().bold());
    } else {
        println!("{} refresh failed", "✗".red().bold());
    }
    Ok(())
}
