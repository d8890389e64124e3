//! DRAM simulator CLI.
//!
//! Loads the configuration file, applies command-line overrides, and runs
//! one simulation in either mode:
//! 1. **cpu:** trace-driven cores (one per `--trace`) in front of memory.
//! 2. **dram:** raw DRAM-trace replay into the controllers.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use memsim_core::config::Config;
use memsim_core::sim::{self, SimError, SimSummary};

#[derive(Parser, Debug)]
#[command(
    name = "memsim",
    author,
    version,
    about = "Cycle-accurate DRAM timing and command-scheduling simulator",
    long_about = "Run a memory-system simulation from a config file and one or more traces.\n\nExamples:\n  memsim --config configs/ddr3.cfg --mode dram --trace dram.trace\n  memsim --config configs/ddr3.cfg --mode cpu --trace app1.trace app2.trace --cache all"
)]
struct Cli {
    /// Configuration file (INI-like `key value`, or JSON).
    #[arg(long)]
    config: PathBuf,

    /// Front-end mode: cpu or dram.
    #[arg(long)]
    mode: String,

    /// Trace files; core count equals the trace count in cpu mode.
    #[arg(long = "trace", num_args = 1..)]
    traces: Vec<PathBuf>,

    /// Statistics output file (defaults to <standard>.stats).
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Override the channel count.
    #[arg(long)]
    channel: Option<usize>,

    /// Override the rank count.
    #[arg(long)]
    rank: Option<usize>,

    /// Override the cache topology: all, L3, L1L2, or none.
    #[arg(long)]
    cache: Option<String>,

    /// Override the in-flight request bound (0 = unbounded).
    #[arg(long = "inflight-limit")]
    inflight_limit: Option<usize>,

    /// Override the CPU clock in MHz.
    #[arg(long = "cpu-frequency")]
    cpu_frequency: Option<u64>,

    /// Override the address translation: None or Random.
    #[arg(long)]
    translation: Option<String>,

    /// Override the organization preset.
    #[arg(long)]
    org: Option<String>,

    /// Print each issued DRAM command: on or off.
    #[arg(long = "print-cmd-trace")]
    print_cmd_trace: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match build_and_run(cli) {
        Ok(summary) => {
            print_summary(&summary);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("memsim: {e}");
            process::exit(1);
        }
    }
}

fn build_and_run(cli: Cli) -> Result<SimSummary, SimError> {
    let mut cfg = Config::from_file(&cli.config)?;
    cfg.mode = cli.mode.parse()?;
    if !cli.traces.is_empty() {
        cfg.traces = cli.traces;
    }
    if cli.stats.is_some() {
        cfg.stats_path = cli.stats;
    }
    if let Some(n) = cli.channel {
        cfg.channels = n;
    }
    if let Some(n) = cli.rank {
        cfg.ranks = n;
    }
    if let Some(cache) = &cli.cache {
        cfg.cache = cache.parse()?;
    }
    if let Some(n) = cli.inflight_limit {
        cfg.inflight_limit = n;
    }
    if let Some(mhz) = cli.cpu_frequency {
        cfg.cpu_frequency_mhz = mhz;
    }
    if let Some(t) = &cli.translation {
        cfg.translation = t.parse()?;
    }
    if let Some(org) = cli.org {
        cfg.org = Some(org);
    }
    if let Some(v) = &cli.print_cmd_trace {
        cfg.set("print_cmd_trace", v)?;
    }

    tracing::info!(
        standard = cfg.standard.name(),
        channels = cfg.channels,
        ranks = cfg.ranks,
        mode = ?cfg.mode,
        "starting simulation"
    );
    sim::run(&cfg)
}

fn print_summary(s: &SimSummary) {
    println!(
        "Simulation done: {} cycles, {} reads, {} writes, ipc {:.4}",
        s.cycles, s.reads, s.writes, s.ipc
    );
}
