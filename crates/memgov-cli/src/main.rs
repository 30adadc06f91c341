//! memgov - memory proposal governance CLI
//!
//! ## Commands
//!
//! - `replay`: deterministically replay a recorded stream and check its digests
//! - `run`: feed a stream through a live pipeline and print the governance report
//! - `verify-bundle`: check an exported bundle's hashes and chain

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use memgov_core::{
    import_bundle, read_bundle, write_bundle, GovernanceConfig, GovernancePipeline,
    GovernanceReport, QueueAction, ReplayEngine, ReplayExpectation, ReplayStream,
};

#[derive(Parser)]
#[command(name = "memgov")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Governance for durable agent memory writes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Governance configuration file (JSON)
    #[arg(long, global = true, env = "MEMGOV_CONFIG")]
    config: Option<PathBuf>,

    /// Override the pending-queue capacity
    #[arg(long, global = true, env = "MEMGOV_MAX_PENDING")]
    max_pending: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded stream against a fresh pipeline
    Replay {
        /// Recorded stream (JSON with `proposals` and `decisions`)
        #[arg(long)]
        stream: PathBuf,

        /// Expected digests; exits non-zero on divergence
        #[arg(long)]
        expect: Option<PathBuf>,

        /// Write the replay report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a stream through a live pipeline and print its report
    Run {
        #[arg(long)]
        stream: PathBuf,

        /// Export the resulting state as a bundle
        #[arg(long)]
        bundle_out: Option<PathBuf>,
    },

    /// Verify an exported governance bundle
    VerifyBundle {
        bundle: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    memgov_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref(), cli.max_pending)?;

    let result = match cli.command {
        Commands::Replay {
            stream,
            expect,
            output,
        } => cmd_replay(&config, &stream, expect.as_deref(), output.as_deref()),
        Commands::Run { stream, bundle_out } => {
            cmd_run(&config, &stream, bundle_out.as_deref()).map(|_| ())
        }
        Commands::VerifyBundle { bundle } => cmd_verify_bundle(&config, &bundle).map(|_| ()),
    };
    memgov_core::METRICS.flush();
    result
}

fn load_config(path: Option<&Path>, max_pending: Option<usize>) -> Result<GovernanceConfig> {
    let mut config = match path {
        Some(p) => GovernanceConfig::from_json_file(p)
            .with_context(|| format!("Failed to load config: {:?}", p))?,
        None => GovernanceConfig::default(),
    };
    if let Some(max) = max_pending {
        config = config.with_max_pending(max);
    }
    config.validate().context("Invalid governance configuration")?;
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn load_stream(path: &Path) -> Result<ReplayStream> {
    ReplayStream::from_json_file(path)
        .with_context(|| format!("Failed to load replay stream: {:?}", path))
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write output to {:?}", path))?,
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_replay(
    config: &GovernanceConfig,
    stream_path: &Path,
    expect: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let stream = load_stream(stream_path)?;
    let engine = ReplayEngine::new(config.clone());

    let Some(expect_path) = expect else {
        let report = engine.replay(&stream).context("Replay failed")?;
        return emit(&report, output);
    };

    let expected: ReplayExpectation = read_json(expect_path)?;
    let verification = engine.verify(&stream, &expected).context("Replay failed")?;
    emit(&verification, output)?;
    if !verification.is_match() {
        anyhow::bail!(
            "Replay diverged on {} digest(s): {}",
            verification.divergence_count,
            verification
                .divergences
                .iter()
                .map(|d| d.field.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    info!(
        replay_decisions_hash = %verification.report.replay_decisions_hash,
        "replay matched expectation"
    );
    Ok(())
}

fn cmd_run(
    config: &GovernanceConfig,
    stream_path: &Path,
    bundle_out: Option<&Path>,
) -> Result<GovernanceReport> {
    let stream = load_stream(stream_path)?;
    let mut pipeline = GovernancePipeline::new(config.clone());

    for input in stream.proposals {
        pipeline.propose(input).context("Proposal rejected as malformed")?;
    }
    let mut decisions = stream.decisions;
    decisions.sort_by_key(|d| d.seq);
    for d in &decisions {
        pipeline.act(&d.proposal_id, QueueAction::from(d.action), &d.actor, &d.reason)?;
    }

    let report = pipeline.report();
    emit(&report, None)?;

    if let Some(path) = bundle_out {
        let bundle = pipeline.export_bundle()?;
        write_bundle(path, &bundle)
            .with_context(|| format!("Failed to write bundle to {:?}", path))?;
        info!(path = ?path, bundle_hash = %bundle.bundle_hash, "bundle written");
    }

    ensure_invariants(&report)?;
    Ok(report)
}

fn cmd_verify_bundle(config: &GovernanceConfig, path: &Path) -> Result<GovernanceReport> {
    let bundle = read_bundle(path).with_context(|| format!("Failed to read bundle: {:?}", path))?;
    let bundle_hash = bundle.bundle_hash.clone();
    let pipeline = import_bundle(config.clone(), bundle)
        .with_context(|| format!("Bundle failed verification: {:?}", path))?;
    let report = pipeline.report();
    println!("Bundle verified: {}", bundle_hash);
    println!("  Proposals:  {}", pipeline.proposals().count());
    println!("  Records:    {}", report.provenance_stats.record_count);
    println!("  Provenance: {}", report.provenance_hash);
    ensure_invariants(&report)?;
    Ok(report)
}

fn ensure_invariants(report: &GovernanceReport) -> Result<()> {
    if !report.invariants_hold() {
        anyhow::bail!(
            "Governance invariants violated: silent_write_count={}, conflict_unsurfaced_count={}",
            report.silent_write_count,
            report.conflict_unsurfaced_count
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memgov_core::{MemoryType, ProposalInput};

    fn write_stream(dir: &Path) -> PathBuf {
        let stream = ReplayStream {
            proposals: vec![
                ProposalInput::new(
                    "s",
                    MemoryType::SessionContext,
                    "turn",
                    serde_json::json!(1),
                    0.9,
                ),
                ProposalInput::new("s", MemoryType::Fact, "user.age", serde_json::json!(30), 0.9),
            ],
            decisions: Vec::new(),
        };
        let path = dir.join("stream.json");
        std::fs::write(&path, serde_json::to_string(&stream).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_run_writes_verifiable_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let stream = write_stream(dir.path());
        let bundle_path = dir.path().join("bundle.json");
        let config = GovernanceConfig::default();

        let report = cmd_run(&config, &stream, Some(&bundle_path)).unwrap();
        assert_eq!(report.queue_stats.total_submitted, 2);

        let verified = cmd_verify_bundle(&config, &bundle_path).unwrap();
        assert_eq!(verified.provenance_hash, report.provenance_hash);
    }

    #[test]
    fn test_replay_divergence_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let stream = write_stream(dir.path());
        let config = GovernanceConfig::default();

        let out = dir.path().join("report.json");
        cmd_replay(&config, &stream, None, Some(&out)).unwrap();
        let report: memgov_core::ReplayReport = read_json(&out).unwrap();

        let expect = dir.path().join("expect.json");
        std::fs::write(
            &expect,
            serde_json::to_string(&ReplayExpectation::from(&report)).unwrap(),
        )
        .unwrap();
        assert!(cmd_replay(&config, &stream, Some(&expect), None).is_ok());

        let wrong = ReplayExpectation {
            replay_decisions_hash: report.replay_decisions_hash.clone(),
            ledger_state_hash: "0".repeat(64),
        };
        std::fs::write(&expect, serde_json::to_string(&wrong).unwrap()).unwrap();
        assert!(cmd_replay(&config, &stream, Some(&expect), None).is_err());
    }

    #[test]
    fn test_unreadable_stream_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = cmd_run(&GovernanceConfig::default(), &path, None).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }

    #[test]
    fn test_max_pending_override() {
        let config = load_config(None, Some(4)).unwrap();
        assert_eq!(config.max_pending, 4);
        assert!(load_config(None, Some(0)).is_err());
    }
}
