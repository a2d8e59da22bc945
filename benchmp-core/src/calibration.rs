//! Overhead Calibration
//!
//! Three process-wide estimates, each computed at most once:
//!
//! - `enough`: the shortest run length (µs) at which timing is linear in the
//!   iteration count
//! - timing overhead: cost of one clock read, in µs
//! - loop overhead: cost of one iteration of an empty timing loop, in µs
//!
//! Each may be pinned through the environment (`ENOUGH`, `TIMING_O`,
//! `LOOP_O`), which skips its measurement entirely.

use crate::ledger::Ledger;
use crate::measure::{Mark, Timer};
use crate::timing::{PointerChase, grow_to_enough};
use benchmp_ipc::Sample;
use std::hint::black_box;
use std::sync::OnceLock;

/// Repetitions used by every calibration measurement
pub const TRIES: usize = 11;

/// Default run length when no candidate proves linear (µs)
pub const SHORT: u64 = 50_000;

/// Candidate run lengths, shortest first (µs)
pub const ENOUGH_CANDIDATES: [u64; 4] = [5_000, 10_000, 50_000, 100_000];

/// Iteration multipliers checked for proportional timing
pub const LINEARITY_POINTS: [f64; 3] = [1.015, 1.02, 1.035];

/// Largest relative deviation from proportional scaling accepted
pub const LINEARITY_TOLERANCE: f64 = 0.0025;

/// Timing overhead is only measured when `enough` is at most this (µs)
pub const TIMING_OVERHEAD_THRESHOLD: u64 = 50_000;

/// Attempts `find_n` makes before giving up on a candidate
const FIND_N_ATTEMPTS: usize = 10;

/// Starting iteration count for the `enough` search
const INITIAL_SEARCH_ITERATIONS: u64 = 10_000;

/// Environment variable pinning `enough`
pub const ENV_ENOUGH: &str = "ENOUGH";
/// Environment variable pinning the timing overhead
pub const ENV_TIMING_OVERHEAD: &str = "TIMING_O";
/// Environment variable pinning the loop overhead
pub const ENV_LOOP_OVERHEAD: &str = "LOOP_O";

/// Calibration values supplied from outside instead of measured
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationOverrides {
    /// Pinned `enough` (µs)
    pub enough: Option<u64>,
    /// Pinned clock-read cost (µs)
    pub timing_overhead: Option<u64>,
    /// Pinned per-iteration loop cost (µs)
    pub loop_overhead: Option<f64>,
}

impl CalibrationOverrides {
    /// Read overrides from `ENOUGH`, `TIMING_O` and `LOOP_O`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary key lookup.
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            enough: parse_override(&lookup, ENV_ENOUGH),
            timing_overhead: parse_override(&lookup, ENV_TIMING_OVERHEAD),
            loop_overhead: parse_override(&lookup, ENV_LOOP_OVERHEAD),
        }
    }

    /// Fill unset fields from `fallback`
    pub fn or(self, fallback: CalibrationOverrides) -> Self {
        Self {
            enough: self.enough.or(fallback.enough),
            timing_overhead: self.timing_overhead.or(fallback.timing_overhead),
            loop_overhead: self.loop_overhead.or(fallback.loop_overhead),
        }
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable calibration override");
            None
        }
    }
}

/// Lazily computed calibration state
#[derive(Debug, Default)]
pub struct Calibration {
    overrides: CalibrationOverrides,
    enough: OnceLock<u64>,
    timing_overhead: OnceLock<u64>,
    loop_overhead: OnceLock<f64>,
}

impl Calibration {
    /// Calibration that measures whatever `overrides` leaves unset
    pub fn new(overrides: CalibrationOverrides) -> Self {
        Self {
            overrides,
            ..Self::default()
        }
    }

    /// Calibration seeded from the environment
    pub fn from_env() -> Self {
        Self::new(CalibrationOverrides::from_env())
    }

    /// Calibration with every value pinned; never measures anything
    pub fn fixed(enough: u64, timing_overhead: u64, loop_overhead: f64) -> Self {
        Self::new(CalibrationOverrides {
            enough: Some(enough),
            timing_overhead: Some(timing_overhead),
            loop_overhead: Some(loop_overhead),
        })
    }

    /// The process-wide calibration, seeded from the environment on first use
    pub fn global() -> &'static Calibration {
        static GLOBAL: OnceLock<Calibration> = OnceLock::new();
        GLOBAL.get_or_init(Calibration::from_env)
    }

    /// Overrides this calibration was created with
    pub fn overrides(&self) -> CalibrationOverrides {
        self.overrides
    }

    /// The shortest trustworthy run length in µs
    pub fn enough(&self) -> u64 {
        *self.enough.get_or_init(|| {
            if let Some(enough) = self.overrides.enough {
                return enough;
            }
            let enough = EnoughSearch::new().compute();
            tracing::debug!(enough, "calibrated run length");
            enough
        })
    }

    /// `max(requested, enough())`
    pub fn get_enough(&self, requested: u64) -> u64 {
        self.enough().max(requested)
    }

    /// Cost of one clock read in µs
    pub fn timing_overhead(&self) -> u64 {
        *self.timing_overhead.get_or_init(|| {
            if let Some(overhead) = self.overrides.timing_overhead {
                return overhead;
            }
            let enough = self.enough();
            if enough > TIMING_OVERHEAD_THRESHOLD {
                return 0;
            }
            let overhead = measure_timing_overhead(enough);
            tracing::debug!(overhead, "calibrated timing overhead");
            overhead
        })
    }

    /// Cost of one empty loop iteration in µs; never negative
    pub fn loop_overhead(&self) -> f64 {
        *self.loop_overhead.get_or_init(|| {
            let overhead = match self.overrides.loop_overhead {
                Some(overhead) => overhead,
                None => {
                    let overhead = measure_loop_overhead(self.enough(), self.timing_overhead());
                    tracing::debug!(overhead, "calibrated loop overhead");
                    overhead
                }
            };
            if overhead.is_finite() && overhead > 0.0 { overhead } else { 0.0 }
        })
    }

    /// Compute every value now so later reads are free
    pub fn prime(&self) {
        self.enough();
        self.timing_overhead();
        self.loop_overhead();
    }
}

/// Minimum of `TRIES` grown runs of `body`
fn fastest_grown_run<F>(body: &mut F, enough: u64, subtract: u64) -> Sample
where
    F: FnMut(u64),
{
    let mut iterations = 1;
    let mut ledger = Ledger::new(TRIES);
    for _ in 0..TRIES {
        let sample = grow_to_enough(body, &mut iterations, enough);
        if sample.elapsed_us > subtract {
            ledger.insert(sample.elapsed_us - subtract, sample.iterations);
        }
    }
    ledger.min_sample()
}

fn measure_timing_overhead(enough: u64) -> u64 {
    let fastest = fastest_grown_run(
        &mut |n| {
            for _ in 0..n {
                black_box(Mark::now());
            }
        },
        enough,
        0,
    );
    fastest.elapsed_us / fastest.iterations.max(1)
}

fn measure_loop_overhead(enough: u64, timing_overhead: u64) -> f64 {
    let chase = PointerChase::new();
    let one = fastest_grown_run(
        &mut |n| {
            chase.one(n);
        },
        enough,
        timing_overhead,
    );
    let two = fastest_grown_run(
        &mut |n| {
            chase.two(n);
        },
        enough,
        timing_overhead,
    );
    solve_loop_overhead(one, two)
}

/// Solve `loop + 1·load = t1`, `loop + 2·load = t2` for the loop term.
///
/// Negative or non-finite solutions yield zero.
pub fn solve_loop_overhead(one: Sample, two: Sample) -> f64 {
    let overhead = 2.0 * one.per_iteration_us() - two.per_iteration_us();
    if overhead.is_finite() && overhead > 0.0 { overhead } else { 0.0 }
}

/// Time ten dependent loads per iteration over `iterations` iterations
pub fn chase_duration(iterations: u64) -> u64 {
    let chase = PointerChase::new();
    let timer = Timer::start();
    chase.ten(iterations);
    timer.stop()
}

/// Search for the shortest candidate run length with linear timing.
///
/// `run(n)` runs `n` iterations of a reference workload and returns the
/// elapsed microseconds. The iteration count found for one candidate seeds
/// the search for the next.
#[derive(Debug)]
pub struct EnoughSearch<P> {
    run: P,
    iterations: u64,
    last_us: Option<u64>,
}

impl EnoughSearch<fn(u64) -> u64> {
    /// Search driven by the pointer-chase reference workload
    pub fn new() -> Self {
        Self::with_runner(chase_duration)
    }
}

impl Default for EnoughSearch<fn(u64) -> u64> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EnoughSearch<P>
where
    P: FnMut(u64) -> u64,
{
    /// Search driven by a custom reference run
    pub fn with_runner(run: P) -> Self {
        Self {
            run,
            iterations: INITIAL_SEARCH_ITERATIONS,
            last_us: None,
        }
    }

    /// Fastest of `TRIES - 1` runs of `n` iterations
    pub fn time_n(&mut self, n: u64) -> u64 {
        let mut ledger = Ledger::new(TRIES);
        for _ in 1..TRIES {
            let us = (self.run)(n);
            ledger.insert(us, n);
        }
        ledger.min_sample().elapsed_us
    }

    /// Find an iteration count whose run lasts within ±2% of `target_us`
    pub fn find_n(&mut self, target_us: u64) -> Option<u64> {
        let target = target_us as f64;
        let mut usecs = match self.last_us {
            Some(us) => us,
            None => self.time_n(self.iterations),
        };

        let mut found = None;
        for _ in 0..FIND_N_ATTEMPTS {
            let measured = usecs as f64;
            if 0.98 * target < measured && measured < 1.02 * target {
                found = Some(self.iterations);
                break;
            }
            self.iterations = if usecs < 1000 {
                self.iterations.saturating_mul(2)
            } else {
                (self.iterations as f64 / measured * target) as u64 + 1
            };
            usecs = self.time_n(self.iterations);
        }

        self.last_us = Some(usecs);
        found
    }

    /// Whether timing scales proportionally with iterations around `target_us`
    pub fn is_linear(&mut self, target_us: u64) -> bool {
        let Some(n) = self.find_n(target_us) else {
            return false;
        };

        let baseline = self.time_n(n) as f64;
        for multiplier in LINEARITY_POINTS {
            let measured = self.time_n((n as f64 * multiplier) as u64) as f64;
            let expected = (baseline * multiplier).trunc();
            if expected <= 0.0 {
                return false;
            }
            if (measured - expected).abs() / expected > LINEARITY_TOLERANCE {
                return false;
            }
        }
        true
    }

    /// First linear candidate, or [`SHORT`] if none is
    pub fn compute(&mut self) -> u64 {
        for candidate in ENOUGH_CANDIDATES {
            if self.is_linear(candidate) {
                return candidate;
            }
        }
        SHORT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_fixed_never_measures() {
        let calibration = Calibration::fixed(7000, 2, 0.25);
        assert_eq!(calibration.enough(), 7000);
        assert_eq!(calibration.timing_overhead(), 2);
        assert_eq!(calibration.loop_overhead(), 0.25);
        assert_eq!(calibration.get_enough(1000), 7000);
        assert_eq!(calibration.get_enough(9000), 9000);
    }

    #[test]
    fn test_negative_loop_override_clamped() {
        let calibration = Calibration::fixed(5000, 0, -1.5);
        assert_eq!(calibration.loop_overhead(), 0.0);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [("ENOUGH", "20000"), ("LOOP_O", "0.003"), ("TIMING_O", "x")]
            .into_iter()
            .collect();
        let overrides = CalibrationOverrides::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(overrides.enough, Some(20_000));
        assert_eq!(overrides.loop_overhead, Some(0.003));
        assert_eq!(overrides.timing_overhead, None);
    }

    #[test]
    fn test_overrides_or() {
        let env = CalibrationOverrides {
            enough: Some(1),
            ..Default::default()
        };
        let file = CalibrationOverrides {
            enough: Some(2),
            timing_overhead: Some(3),
            loop_overhead: None,
        };
        let merged = env.or(file);
        assert_eq!(merged.enough, Some(1));
        assert_eq!(merged.timing_overhead, Some(3));
        assert_eq!(merged.loop_overhead, None);
    }

    #[test]
    fn test_large_enough_skips_timing_overhead() {
        let calibration = Calibration::new(CalibrationOverrides {
            enough: Some(100_000),
            ..Default::default()
        });
        assert_eq!(calibration.timing_overhead(), 0);
    }

    #[test]
    fn test_measured_overheads_are_stable() {
        let calibration = Calibration::new(CalibrationOverrides {
            enough: Some(2_000),
            ..Default::default()
        });
        let timing = calibration.timing_overhead();
        let looping = calibration.loop_overhead();

        assert!(looping >= 0.0);
        assert!(looping.is_finite());
        assert_eq!(calibration.timing_overhead(), timing);
        assert_eq!(calibration.loop_overhead(), looping);
    }

    #[test]
    fn test_solve_loop_overhead() {
        // loop 1us, load 2us: t1 = 3, t2 = 5
        let one = Sample::new(300, 100);
        let two = Sample::new(500, 100);
        assert_eq!(solve_loop_overhead(one, two), 1.0);

        // Noise making the two-load run relatively slow clamps to zero
        assert_eq!(solve_loop_overhead(Sample::new(100, 100), Sample::new(500, 100)), 0.0);
        assert_eq!(solve_loop_overhead(Sample::EMPTY, Sample::EMPTY), 0.0);
    }

    #[test]
    fn test_linear_cost_selects_shortest_candidate() {
        // 100us setup + 10ns per iteration: linear well within tolerance at 5ms
        let mut search = EnoughSearch::with_runner(|n| 100 + n / 100);
        assert_eq!(search.compute(), 5_000);
    }

    #[test]
    fn test_fixed_cost_dominated_falls_back_to_short() {
        // A large constant term breaks proportional scaling at every candidate
        let mut search = EnoughSearch::with_runner(|n| 20_000 + n / 100);
        assert_eq!(search.compute(), SHORT);
    }

    #[test]
    fn test_find_n_converges_and_persists() {
        let mut search = EnoughSearch::with_runner(|n| n / 10);
        let n = search.find_n(5_000).unwrap();
        let us = n / 10;
        assert!((4_900..=5_100).contains(&us), "{n} -> {us}");

        // Seeded from the previous search
        let m = search.find_n(10_000).unwrap();
        assert!(m > n);
    }

    #[test]
    fn test_chase_duration_grows_with_iterations() {
        let short = (0..5).map(|_| chase_duration(1_000)).min().unwrap_or(0);
        let long = (0..5).map(|_| chase_duration(1_000_000)).min().unwrap_or(0);
        assert!(long > short);
    }
}
