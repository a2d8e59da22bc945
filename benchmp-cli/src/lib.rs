#![warn(missing_docs)]
//! benchmp CLI Library
//!
//! Multi-process orchestration, configuration and result formatting, plus
//! the `benchmp` command line that times the built-in workloads.
//!
//! # Example
//!
//! ```ignore
//! use benchmp_cli::{BenchOptions, benchmark, format};
//! use benchmp_core::{Calibration, FnWorkload};
//!
//! let mut workload = FnWorkload::new(|n| for _ in 0..n { std::hint::black_box(()); });
//! let options = BenchOptions { parallel: 4, ..Default::default() };
//! let report = benchmark(&mut workload, &options, Calibration::global())?;
//! if let Some(line) = format::micro("null", report.result.iterations) {
//!     println!("{line}");
//! }
//! ```

mod config;
pub mod format;
mod supervisor;
pub mod workloads;

pub use config::*;
pub use supervisor::*;

use benchmp_core::Calibration;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::Path;
use std::time::Duration;
use workloads::WorkloadKind;

/// benchmp CLI arguments
#[derive(Parser, Debug)]
#[command(name = "benchmp")]
#[command(author, version, about = "benchmp - self-calibrating micro-benchmark harness")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Optional subcommand; defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run arguments used when no subcommand is given
    #[command(flatten)]
    pub run: RunArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Arguments for the timed run, from `run` or the top level
    pub fn run_args(&self) -> &RunArgs {
        match &self.command {
            Some(Commands::Run(args)) => args,
            _ => &self.run,
        }
    }
}

/// Arguments of a timed run
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Workload to time
    #[arg(value_enum, default_value = "null")]
    pub workload: WorkloadKind,

    /// Number of worker processes timed concurrently
    #[arg(short = 'P', long)]
    pub parallel: Option<usize>,

    /// Warmup between the ready barrier and the timed interval (e.g., "200ms")
    #[arg(short = 'W', long)]
    pub warmup: Option<String>,

    /// Samples recorded by each worker
    #[arg(short = 'N', long)]
    pub repetitions: Option<usize>,

    /// Minimum run length (e.g., "50ms"); the calibrated value wins if longer
    #[arg(long)]
    pub enough: Option<String>,

    /// Bound on each synchronization barrier (e.g., "30s")
    #[arg(long)]
    pub timeout: Option<String>,

    /// Time in the calling process instead of forked workers
    #[arg(long)]
    pub in_process: bool,

    /// Busy-wait per iteration of the spin workload
    #[arg(long, default_value = "10us")]
    pub spin: String,

    /// Unit of the per-operation result
    #[arg(long, value_enum, default_value = "micro")]
    pub unit: Unit,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Time the workload (default)
    Run(RunArgs),
    /// Print the calibrated run length and overheads
    Calibrate,
    /// Write a default benchmp.toml to the current directory
    Init,
}

/// Per-operation result unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Unit {
    /// Nanoseconds
    Nano,
    /// Microseconds
    Micro,
    /// Milliseconds
    Milli,
}

/// Run the benchmp CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if something goes wrong.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the benchmp CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Results go to stdout, logs to stderr
    let filter = if cli.verbose { "benchmp=debug" } else { "benchmp=info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Discover benchmp.toml configuration (CLI flags override)
    let config = BenchConfig::discover().unwrap_or_default();
    let calibration = Calibration::new(config.calibration_overrides());

    match cli.command {
        Some(Commands::Calibrate) => print_calibration(&calibration),
        Some(Commands::Init) => write_default_config(Path::new(CONFIG_FILE)),
        Some(Commands::Run(_)) | None => {
            run_workload(cli.run_args(), cli.verbose, &config, &calibration)
        }
    }
}

/// Layer CLI overrides on top of benchmp.toml values
pub fn build_options(cli: &RunArgs, config: &BenchConfig) -> anyhow::Result<BenchOptions> {
    let mut options = config.bench_options()?;
    if let Some(parallel) = cli.parallel {
        options.parallel = parallel.max(1);
    }
    if let Some(warmup) = &cli.warmup {
        options.warmup = BenchConfig::parse_duration(warmup)?;
    }
    if let Some(repetitions) = cli.repetitions {
        options.repetitions = repetitions.max(1);
    }
    if let Some(enough) = &cli.enough {
        options.enough = BenchConfig::parse_duration(enough)?;
    }
    if let Some(timeout) = &cli.timeout {
        options.timeout = Some(Duration::from_micros(BenchConfig::parse_duration(timeout)?));
    }
    Ok(options)
}

fn run_workload(
    cli: &RunArgs,
    verbose: bool,
    config: &BenchConfig,
    calibration: &Calibration,
) -> anyhow::Result<()> {
    let options = build_options(cli, config)?;
    let isolation = if cli.in_process {
        IsolationMode::InProcess
    } else {
        config.runner.isolation
    };
    if !isolation.is_isolated() && options.parallel > 1 {
        anyhow::bail!("in-process runs support a single worker (got --parallel {})", options.parallel);
    }

    let spin = Duration::from_micros(BenchConfig::parse_duration(&cli.spin)?);
    let mut workload = cli.workload.build(spin);
    tracing::info!(
        workload = cli.workload.label(),
        parallel = options.parallel,
        repetitions = options.repetitions,
        isolated = isolation.is_isolated(),
        "timing workload"
    );

    let result = if isolation.is_isolated() {
        let report = benchmark(&mut workload, &options, calibration)?;
        if report.is_degraded() {
            tracing::warn!(
                hung = ?report.hung,
                reported = report.reported,
                "result excludes workers that did not finish"
            );
        }
        if verbose {
            // Ledger is ordered slowest first
            if let Some(slowest) = report.ledger.samples().first() {
                println!(
                    "{} samples, fastest {:.4} us/iter, slowest {:.4} us/iter",
                    report.ledger.len(),
                    report.ledger.min_sample().per_iteration_us(),
                    slowest.per_iteration_us()
                );
            }
        }
        report.result
    } else {
        measure_in_process(&mut workload, &options, calibration)
    };

    let operations = result.iterations.saturating_mul(cli.workload.ops_per_iteration());
    let line = match cli.unit {
        Unit::Nano => format::nano(cli.workload.label(), operations),
        Unit::Micro => format::micro(cli.workload.label(), operations),
        Unit::Milli => format::milli(cli.workload.label(), operations),
    };
    match line {
        Some(line) => println!("{line}"),
        None => anyhow::bail!("{} did not produce a measurable result", cli.workload.label()),
    }
    if verbose {
        if let Some(line) = format::ptime(result.iterations) {
            println!("{line}");
        }
    }
    Ok(())
}

fn print_calibration(calibration: &Calibration) -> anyhow::Result<()> {
    calibration.prime();
    println!("enough: {} microseconds", calibration.enough());
    println!("timing overhead: {} microseconds", calibration.timing_overhead());
    println!("loop overhead: {:.6} microseconds", calibration.loop_overhead());
    Ok(())
}

fn write_default_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    std::fs::write(path, BenchConfig::default_toml())?;
    println!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("benchmp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_flags_override_config() {
        let config: BenchConfig = toml::from_str(
            r#"
            [runner]
            parallel = 2
            warmup = "1ms"
            repetitions = 5
            "#,
        )
        .unwrap();

        let cli = parse(&["spin", "-P", "4", "--enough", "20ms"]);
        let cli = cli.run_args();
        let options = build_options(cli, &config).unwrap();
        assert_eq!(cli.workload, WorkloadKind::Spin);
        assert_eq!(options.parallel, 4);
        assert_eq!(options.enough, 20_000);
        // Untouched flags keep the file's values
        assert_eq!(options.warmup, 1_000);
        assert_eq!(options.repetitions, 5);
        assert!(options.timeout.is_none());
    }

    #[test]
    fn defaults_without_config() {
        let cli = parse(&[]);
        let cli = cli.run_args();
        let options = build_options(cli, &BenchConfig::default()).unwrap();
        assert_eq!(cli.workload, WorkloadKind::Null);
        assert_eq!(cli.unit, Unit::Micro);
        assert_eq!(options, BenchOptions::default());
    }

    #[test]
    fn timeout_flag_parses_units() {
        let cli = parse(&["--timeout", "2s", "-N", "0"]);
        let options = build_options(cli.run_args(), &BenchConfig::default()).unwrap();
        assert_eq!(options.timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.repetitions, 1);
    }

    #[test]
    fn bad_duration_is_an_error() {
        let cli = parse(&["--warmup", "soon"]);
        assert!(build_options(cli.run_args(), &BenchConfig::default()).is_err());
    }

    #[test]
    fn calibrate_subcommand() {
        let cli = parse(&["calibrate"]);
        assert!(matches!(cli.command, Some(Commands::Calibrate)));
    }

    #[test]
    fn run_subcommand_takes_workload_and_flags() {
        let cli = parse(&["run", "spin", "-P", "3", "--unit", "nano", "-v"]);
        assert!(matches!(cli.command, Some(Commands::Run(_))));
        assert!(cli.verbose);
        let args = cli.run_args();
        assert_eq!(args.workload, WorkloadKind::Spin);
        assert_eq!(args.parallel, Some(3));
        assert_eq!(args.unit, Unit::Nano);
    }

    #[test]
    fn bare_run_uses_defaults() {
        let cli = parse(&["run"]);
        assert_eq!(cli.run_args().workload, WorkloadKind::Null);
    }
}
