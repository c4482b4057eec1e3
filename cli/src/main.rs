//! chainlog command-line driver.
//!
//! Usage:
//!   chainlog simulate --config archiver.toml --ledger ledger.jsonl --records 25
//!   chainlog verify --dir ./archives --ledger ledger.jsonl
//!   chainlog reconcile --config archiver.toml --ledger ledger.jsonl

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chainlog_archive::{ledger::FileLedger, reconcile::reconcile, ArchiveWriter};
use chainlog_chain::HashAlgorithm;
use chainlog_contracts::{
    config::ArchiverConfig,
    error::{ArchiveError, ArchiveResult},
    ledger::ArchiveLedger,
    record::{LogRecord, MessageRecord, TimestampRecord},
};
use chainlog_verify::{ChainAnchor, ChainReport, ChainVerifier};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Write, reconcile and verify hash-chained audit archives.
#[derive(Parser)]
#[command(name = "chainlog", about = "Hash-chained audit archive tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Feed synthetic records through an archive writer.
    Simulate {
        /// Archiver TOML configuration.
        #[arg(long)]
        config: PathBuf,
        /// JSON-lines ledger file, created if missing.
        #[arg(long)]
        ledger: PathBuf,
        #[arg(long, default_value_t = 10)]
        records: u64,
        /// Identifier of the first synthetic record.
        #[arg(long, default_value_t = 1)]
        first_id: u64,
        /// Emit a time-stamp record every N messages (0 disables).
        #[arg(long, default_value_t = 0)]
        timestamp_every: u64,
    },
    /// Verify every archive in a directory and the links between them.
    Verify {
        #[arg(long)]
        dir: PathBuf,
        /// Require this digest algorithm, e.g. SHA-256.
        #[arg(long)]
        algorithm: Option<String>,
        /// Hex digest the first archive must link to, instead of genesis.
        #[arg(long)]
        anchor: Option<String>,
        /// Also check the directory against this ledger.
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Sweep temporary files and bring the ledger in line with the directory.
    Reconcile {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        ledger: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // RUST_LOG=debug for per-archive detail.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Simulate {
            config,
            ledger,
            records,
            first_id,
            timestamp_every,
        } => run_simulate(&config, &ledger, records, first_id, timestamp_every),
        Command::Verify {
            dir,
            algorithm,
            anchor,
            ledger,
        } => run_verify(&dir, algorithm.as_deref(), anchor.as_deref(), ledger.as_deref()),
        Command::Reconcile { config, ledger } => run_reconcile(&config, &ledger),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("chainlog error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn run_simulate(
    config_path: &Path,
    ledger_path: &Path,
    count: u64,
    first_id: u64,
    timestamp_every: u64,
) -> ArchiveResult<bool> {
    let config = ArchiverConfig::from_file(config_path)?;
    let ledger: Arc<dyn ArchiveLedger> = Arc::new(FileLedger::open(ledger_path)?);
    let writer = ArchiveWriter::open(config, ledger.clone())?;

    let report = writer.reconcile_report();
    if !report.is_clean() {
        println!(
            "startup reconciliation: {} temp file(s) removed, {} adopted, {} quarantined",
            report.removed_temp_files.len(),
            report.adopted.len(),
            report.quarantined.len()
        );
    }

    let mut id = first_id;
    let mut rotations = 0usize;
    for n in 0..count {
        let message = MessageRecord {
            id,
            time: Utc::now(),
            query_id: format!("query-{id}"),
            message: format!("<request seq=\"{n}\"/>"),
            signature: format!("sig-{id}"),
            response: n % 2 == 1,
        };
        id += 1;
        if writer.write(LogRecord::from(message))? {
            rotations += 1;
        }

        if timestamp_every > 0 && (n + 1) % timestamp_every == 0 {
            let stamp = TimestampRecord {
                id,
                time: Utc::now(),
                token: format!("token-{id}"),
            };
            id += 1;
            writer.write(LogRecord::from(stamp))?;
        }
    }
    writer.close()?;

    let head = ledger.last_digest_entry()?;
    info!(records = count, rotations, "simulation finished");
    println!("wrote {} record(s), next id {}", count, id);
    match head {
        Some(entry) => println!("chain head: {} {}", entry.archive_filename(), entry.digest_hex()),
        None => println!("chain head: (none)"),
    }
    Ok(true)
}

fn run_verify(
    dir: &Path,
    algorithm: Option<&str>,
    anchor: Option<&str>,
    ledger_path: Option<&Path>,
) -> ArchiveResult<bool> {
    let mut verifier = ChainVerifier::new();
    if let Some(name) = algorithm {
        verifier = verifier.with_algorithm(name.parse::<HashAlgorithm>()?);
    }
    if let Some(hex_digest) = anchor {
        let digest = hex::decode(hex_digest).map_err(|e| ArchiveError::InvalidArgument {
            reason: format!("anchor is not a hex digest: {}", e),
        })?;
        verifier = verifier.with_anchor(ChainAnchor::Digest(digest));
    }

    let report = match ledger_path {
        Some(path) => {
            let ledger = FileLedger::open(path)?;
            verifier.verify_with_ledger(dir, &ledger)?
        }
        None => verifier.verify_directory(dir)?,
    };

    print_report(&report);
    Ok(report.passed)
}

fn run_reconcile(config_path: &Path, ledger_path: &Path) -> ArchiveResult<bool> {
    let config = ArchiverConfig::from_file(config_path)?;
    let algorithm: HashAlgorithm = config.hash_algorithm.parse()?;
    let ledger = FileLedger::open(ledger_path)?;

    let report = reconcile(&config.output_dir, algorithm, &ledger)?;
    for name in &report.removed_temp_files {
        println!("  removed   {}", name);
    }
    for entry in &report.adopted {
        println!("  adopted   {} {}", entry.archive_filename(), entry.digest_hex());
    }
    for name in &report.quarantined {
        println!("  quarantined {}", name);
    }
    if report.is_clean() {
        println!("directory and ledger already agree");
    }
    Ok(report.quarantined.is_empty())
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_report(report: &ChainReport) {
    for summary in &report.archives {
        println!(
            "  ok   {}  {} record(s)  {} {}",
            summary.archive,
            summary.record_count,
            summary.algorithm,
            hex::encode(&summary.digest)
        );
    }
    for failure in &report.failures {
        println!("  FAIL {}  {}", failure.archive, failure.reason);
    }
    if report.passed {
        println!("chain intact ({} archive(s))", report.archives.len());
    } else {
        println!("chain BROKEN ({} failure(s))", report.failures.len());
    }
}
