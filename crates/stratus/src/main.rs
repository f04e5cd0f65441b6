mod snapshot;

use clap::{Parser, Subcommand, ValueEnum};
use snapshot::Snapshot;
use std::path::{Path, PathBuf};
use stratus_scheduler::{
    MalformedQuantityPolicy, Overhead, OverheadCalculator, OverheadConfig, SoftTaintPolicy,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "stratus", about = "Stratus daemon overhead estimator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the resources daemons will take on every node claim template
    Overhead {
        /// Snapshot file with templates and daemon pods
        #[arg(long, env = "STRATUS_SNAPSHOT")]
        snapshot: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
        /// Fail instead of skipping daemons with malformed resource requests
        #[arg(long)]
        abort_on_malformed: bool,
        /// Let PreferNoSchedule taints admit every daemon
        #[arg(long)]
        ignore_soft_taints: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

fn main() -> miette::Result<()> {
    // Initialize tracing; stdout is reserved for the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Overhead {
            snapshot,
            format,
            abort_on_malformed,
            ignore_soft_taints,
        } => {
            let config = overhead_config(abort_on_malformed, ignore_soft_taints);
            let overhead = run_overhead(&snapshot, config)?;
            println!("{}", render(&overhead, format)?);
            Ok(())
        }
    }
}

fn overhead_config(abort_on_malformed: bool, ignore_soft_taints: bool) -> OverheadConfig {
    OverheadConfig {
        malformed_quantity: if abort_on_malformed {
            MalformedQuantityPolicy::Abort
        } else {
            MalformedQuantityPolicy::SkipDaemon
        },
        soft_taints: if ignore_soft_taints {
            SoftTaintPolicy::Ignore
        } else {
            SoftTaintPolicy::Enforce
        },
    }
}

/// Load a snapshot and compute the overhead of every template in it
fn run_overhead(path: &Path, config: OverheadConfig) -> miette::Result<Overhead> {
    info!("Computing daemon overhead from {}", path.display());

    let snapshot = Snapshot::load(path)?;
    let templates = snapshot.templates()?;
    let daemons = snapshot.daemons(config.malformed_quantity)?;

    Ok(OverheadCalculator::new(config).compute(&templates, &daemons)?)
}

fn render(overhead: &Overhead, format: OutputFormat) -> miette::Result<String> {
    let rendered = match format {
        OutputFormat::Yaml => stratus_core::to_yaml(overhead)?,
        OutputFormat::Json => stratus_core::to_json_pretty(overhead)?,
    };
    Ok(rendered)
}
