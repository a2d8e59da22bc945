//! Configuration loading from benchmp.toml
//!
//! benchmp configuration can be specified in a `benchmp.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.
//!
//! Calibration values set in the environment (`ENOUGH`, `TIMING_O`, `LOOP_O`)
//! take precedence over the file.

use crate::supervisor::BenchOptions;
use benchmp_core::CalibrationOverrides;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "benchmp.toml";

/// benchmp configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Calibration overrides
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Isolation mode for benchmark execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Run the workload in forked worker processes (default)
    #[default]
    Process,
    /// Run the workload in the calling process (single worker only)
    InProcess,
}

impl IsolationMode {
    /// Whether this mode provides process isolation
    pub fn is_isolated(self) -> bool {
        matches!(self, IsolationMode::Process)
    }
}

/// Runner configuration for benchmark execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of worker processes
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Warmup between the ready barrier and the timed interval (e.g., "0s", "200ms")
    #[serde(default = "default_warmup")]
    pub warmup: String,
    /// Samples recorded per worker
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    /// Requested minimum run length (e.g., "50ms"); calibrated if unset
    #[serde(default)]
    pub enough: Option<String>,
    /// Bound on each synchronization barrier (e.g., "30s")
    #[serde(default)]
    pub timeout: Option<String>,
    /// Isolation mode: "process" or "in-process"
    #[serde(default)]
    pub isolation: IsolationMode,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            warmup: default_warmup(),
            repetitions: default_repetitions(),
            enough: None,
            timeout: None,
            isolation: IsolationMode::default(),
        }
    }
}

fn default_parallel() -> usize {
    1
}
fn default_warmup() -> String {
    "0s".to_string()
}
fn default_repetitions() -> usize {
    benchmp_core::TRIES
}

/// Pinned calibration values (microseconds)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct CalibrationConfig {
    /// Run length at which timing is linear
    #[serde(default)]
    pub enough: Option<u64>,
    /// Cost of one clock read
    #[serde(default)]
    pub timing_overhead: Option<u64>,
    /// Cost of one empty loop iteration
    #[serde(default)]
    pub loop_overhead: Option<f64>,
}

impl From<CalibrationConfig> for CalibrationOverrides {
    fn from(config: CalibrationConfig) -> Self {
        CalibrationOverrides {
            enough: config.enough,
            timing_overhead: config.timing_overhead,
            loop_overhead: config.loop_overhead,
        }
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!(path = %config_path.display(), error = %e, "ignoring invalid config");
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Runner settings as orchestrator options
    pub fn bench_options(&self) -> anyhow::Result<BenchOptions> {
        let enough = match &self.runner.enough {
            Some(s) => Self::parse_duration(s)?,
            None => 0,
        };
        let timeout = match &self.runner.timeout {
            Some(s) => Some(Duration::from_micros(Self::parse_duration(s)?)),
            None => None,
        };
        Ok(BenchOptions {
            enough,
            parallel: self.runner.parallel.max(1),
            warmup: Self::parse_duration(&self.runner.warmup)?,
            repetitions: self.runner.repetitions.max(1),
            timeout,
        })
    }

    /// Calibration overrides: environment first, then this file
    pub fn calibration_overrides(&self) -> CalibrationOverrides {
        CalibrationOverrides::from_env().or(self.calibration.into())
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# benchmp Configuration

[runner]
# Number of worker processes timed concurrently
parallel = 1
# Warmup between all workers being ready and the timed interval
warmup = "0s"
# Samples recorded by each worker
repetitions = 11
# Minimum run length (uncomment to override the calibrated value when longer)
# enough = "50ms"
# Bound on each synchronization barrier (uncomment to enable)
# timeout = "30s"
# Isolation mode: "process" or "in-process"
isolation = "process"

[calibration]
# Pin calibration values in microseconds instead of measuring them
# (the ENOUGH, TIMING_O and LOOP_O environment variables take precedence)
# enough = 5000
# timing_overhead = 0
# loop_overhead = 0.001
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "250us") to microseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "us"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if value < 0.0 {
            return Err(anyhow::anyhow!("Negative duration: {}", s));
        }

        let multiplier: f64 = match unit_part.to_lowercase().as_str() {
            "ns" => 0.001,
            "us" | "µs" => 1.0,
            "ms" => 1_000.0,
            "s" => 1_000_000.0,
            "m" | "min" => 60_000_000.0,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier) as u64)
    }
}
