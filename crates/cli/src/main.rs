//! Cache hierarchy simulator CLI.
//!
//! This binary drives the simulator from files. It performs:
//! 1. **Run:** Build the hierarchy from a JSON config (or the defaults), replay a request trace, print statistics.
//! 2. **Config:** Print the default configuration as JSON, ready to edit.
//!
//! Logging goes through `tracing`; set `RUST_LOG` (e.g. `RUST_LOG=cachesim_core=debug`) for coherence detail.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cachesim_core::common::{ResponseKind, SimResult};
use cachesim_core::config::Config;
use cachesim_core::sim::{Simulator, trace};
use cachesim_core::stats::STATS_SECTIONS;

#[derive(Parser, Debug)]
#[command(
    name = "cachesim",
    author,
    version,
    about = "Cycle-level cache hierarchy simulator",
    long_about = "Replay a request trace through a MESI cache hierarchy and report statistics.\n\nExamples:\n  cachesim run --trace reads.trace\n  cachesim run --config sys.json --trace mixed.trace --stats cache memory\n  cachesim config > sys.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a trace through the configured hierarchy.
    Run {
        /// JSON configuration; the built-in defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Request trace (`<core> R|W|I <addr> [operand]` per line).
        #[arg(short, long)]
        trace: PathBuf,

        /// Statistics sections to print (summary, core, cache, memory, links); all by default.
        #[arg(long, num_args = 1.., value_parser = clap::builder::PossibleValuesParser::new(STATS_SECTIONS))]
        stats: Vec<String>,

        /// Print every completion as it is drained.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the default configuration as JSON.
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            config,
            trace,
            stats,
            verbose,
        } => cmd_run(config, &trace, &stats, verbose),
        Commands::Config => cmd_config(),
    };
    if let Err(e) = result {
        error!("{e}");
        eprintln!("[!] {e}");
        process::exit(1);
    }
}

/// Builds the hierarchy, replays the trace and prints the requested statistics.
///
/// # Arguments
///
/// * `config` - Optional JSON configuration path.
/// * `trace_path` - Request trace to replay.
/// * `sections` - Statistics sections to print; empty prints all.
/// * `verbose` - Print each completion.
fn cmd_run(
    config: Option<PathBuf>,
    trace_path: &Path,
    sections: &[String],
    verbose: bool,
) -> SimResult<()> {
    let config = match config {
        Some(path) => Config::from_json_file(&path)?,
        None => Config::default(),
    };
    let ops = trace::load(trace_path)?;
    info!(requests = ops.len(), trace = %trace_path.display(), "trace loaded");

    let mut sim = Simulator::new(&config)?;
    let _ = trace::replay(&mut sim, &ops)?;
    sim.check_coherence()?;

    let completions = sim.drain_completions();
    if verbose {
        for c in &completions {
            let result = match &c.response {
                ResponseKind::Data(bytes) => bytes.iter().map(|b| format!("{b:02x}")).collect::<String>(),
                ResponseKind::WriteAck => "write-ack".to_owned(),
                ResponseKind::InvalidateAck => "inv-ack".to_owned(),
            };
            println!(
                "#{:<6} core{} {:#012x} @{:>10} ps  latency {:>7} ps  {result}",
                c.id,
                c.core,
                c.addr,
                c.completed_at,
                c.latency()
            );
        }
    }
    println!("[*] {} requests completed at {} ps", completions.len(), sim.now());
    sim.stats().print_sections(sections);
    Ok(())
}

/// Prints the default configuration.
fn cmd_config() -> SimResult<()> {
    println!("{}", Config::default().to_json_pretty()?);
    Ok(())
}
