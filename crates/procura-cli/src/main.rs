//! Procura CLI
//!
//! Replays scripted tenders against the procurement engine and runs one-shot
//! consensus calculations.
//!
//! # Usage
//! ```bash
//! procura replay scenarios/sample.json [--config procura.toml] [--audit-log audit.jsonl] [--json]
//! procura consensus 87.8 87.2 88.1
//! procura config
//! ```

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use procura_core::{
    ConsensusEngine, ConsensusResult, InMemoryVendorRegistry, IndividualScore, JsonlAuditLog,
    ManualClock, ProcuraConfig, ProcurementService, ScoreSheet, ScoreSubmission, VendorId,
};

mod scenario;

use scenario::{ensure_as_scripted, ReplayReport, Replayer, Scenario};

/// Procura - tender workflow and evaluator consensus
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted tender scenario
    Replay {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Append the audit trail to this JSON-lines file
        #[arg(long, value_name = "FILE")]
        audit_log: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Compute consensus over a set of evaluator totals
    Consensus {
        /// Evaluator totals, 0-100
        #[arg(required = true, num_args = 1..)]
        scores: Vec<f64>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            scenario,
            audit_log,
            json,
        } => replay(config, &scenario, audit_log, json),
        Commands::Consensus { scores, json } => consensus(&config, &scores, json),
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ProcuraConfig> {
    match path {
        Some(path) => ProcuraConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(ProcuraConfig::default()),
    }
}

fn replay(
    config: ProcuraConfig,
    path: &Path,
    audit_log: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let scenario = Scenario::from_file(path)?;
    let audit_path = audit_log.or_else(|| config.audit.jsonl_path.clone());

    let clock = Arc::new(ManualClock::new(scenario.start));
    let mut service = ProcurementService::new(config).with_clock(clock.clone());
    if let Some(audit_path) = &audit_path {
        let sink = JsonlAuditLog::open(audit_path)
            .with_context(|| format!("opening audit log {}", audit_path.display()))?;
        service = service.with_audit_sink(Arc::new(sink));
    }
    if !scenario.vendors.is_empty() {
        let registry = InMemoryVendorRegistry::with_vendors(scenario.vendors.iter().cloned());
        service = service.with_vendor_registry(Arc::new(registry));
    }

    let report = Replayer::new(&service, clock).run(&scenario)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    ensure_as_scripted(&report)
}

fn print_report(report: &ReplayReport) {
    println!("STEPS");
    for step in &report.steps {
        let mark = if step.as_expected { "ok " } else { "!! " };
        match &step.message {
            None => println!("  {}{:>3} {:<20} by {}", mark, step.index, step.action, step.actor),
            Some(message) => println!(
                "  {}{:>3} {:<20} by {} -> rejected: {}",
                mark, step.index, step.action, step.actor, message
            ),
        }
    }

    let tender = &report.tender;
    println!();
    println!("TENDER: {} ({})", tender.title, tender.id);
    println!("STATUS: {} (step {})", tender.status, tender.workflow_step);
    if let Some(vendor) = &tender.awarded_vendor_id {
        println!(
            "AWARDED: {} for {:.2}",
            vendor,
            tender.award_amount.unwrap_or_default()
        );
    }

    if !report.consensus.is_empty() {
        println!();
        println!("CONSENSUS");
        for result in &report.consensus {
            print_consensus(result);
        }
    }

    if !report.ranking.is_empty() {
        println!();
        println!("RANKING");
        for row in &report.ranking {
            println!(
                "  {}. {} mean {:.1} ({} variance)",
                row.rank, row.vendor_id, row.mean_score, row.variance_level
            );
        }
    }
}

fn print_consensus(result: &ConsensusResult) {
    println!(
        "  {}: mean {:.1}, variance {:.2} ({}), consensus {}",
        result.vendor_id,
        result.mean_score,
        result.variance,
        result.variance_level,
        if result.consensus_reached { "reached" } else { "not reached" }
    );
    for outlier in &result.outliers {
        println!(
            "    outlier {} scored {:.1} ({:+.1}){}",
            outlier.evaluator_id,
            outlier.score,
            outlier.deviation,
            if outlier.justification_required {
                ", justification required"
            } else {
                ""
            }
        );
    }
    let unresolved = result.unresolved_outliers().count();
    if unresolved > 0 {
        println!("    {} outlier(s) awaiting justification", unresolved);
    }
    if let Some(chair) = &result.chair_override {
        println!("    overridden by chair {}: {}", chair.chair_id, chair.reason);
    }
}

/// Consensus over bare totals, one anonymous evaluator per value
///
/// Each total is entered as both the technical and the financial score, so
/// the weighted total equals the value given.
fn consensus(config: &ProcuraConfig, totals: &[f64], json: bool) -> anyhow::Result<()> {
    let engine = ConsensusEngine::new(config.scoring.clone());
    let policy = engine.policy();
    let vendor = VendorId::from("adhoc");
    let now = Utc::now();

    let mut scores = Vec::with_capacity(totals.len());
    for (i, total) in totals.iter().enumerate() {
        let sheet = ScoreSheet::new().technical("total", *total).financial("total", *total);
        sheet
            .validate(policy)
            .with_context(|| format!("score #{}", i + 1))?;
        let evaluator = format!("evaluator-{}", i + 1);
        let submission = ScoreSubmission::new(evaluator, vendor.clone(), sheet);
        scores.push(IndividualScore::from_submission(&submission, policy, now));
    }
    let refs: Vec<&IndividualScore> = scores.iter().collect();
    let result = engine
        .compute(&vendor, &refs, None)
        .context("no scores supplied")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_consensus(&result);
    }
    Ok(())
}
