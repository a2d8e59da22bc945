#![warn(missing_docs)]
//! benchmp Core - Timing Runtime
//!
//! This crate provides everything that runs inside a measuring process:
//! - Microsecond wall clock and the bounded, sorted result ledger
//! - Self-calibration of run length, clock cost and loop cost
//! - The single-process timing loop with iteration growth
//! - The per-worker warmup / timing / cooldown state machine

mod calibration;
mod current;
mod ledger;
mod measure;
mod timing;
mod worker;

pub use benchmp_ipc::Sample;
pub use calibration::{
    Calibration, CalibrationOverrides, ENOUGH_CANDIDATES, ENV_ENOUGH, ENV_LOOP_OVERHEAD,
    ENV_TIMING_OVERHEAD, EnoughSearch, LINEARITY_POINTS, LINEARITY_TOLERANCE, SHORT,
    TIMING_OVERHEAD_THRESHOLD, TRIES, chase_duration, solve_loop_overhead,
};
pub use current::{current, reset_current, set_current};
pub use ledger::Ledger;
pub use measure::{Mark, Timer, duration_to_us};
pub use timing::{
    Growth, MAX_ITERATIONS, NEGATIVE_ITERATIONS_LIMIT, PointerChase, adjust, clamp_us,
    grow_to_enough, measure, measure_calibrated, next_iterations,
};
pub use worker::{
    Phase, Step, WorkerConfig, WorkerError, WorkerLink, WorkerState, run_worker,
    shutdown_requested, worker_process_main,
};

/// A unit of work to be timed.
///
/// `run(n)` must perform exactly `n` iterations. `initialize` runs once in
/// each worker before any timing, `cleanup` once before it exits.
pub trait Workload {
    /// Per-process setup, untimed
    fn initialize(&mut self) {}

    /// Perform `iterations` units of work
    fn run(&mut self, iterations: u64);

    /// Per-process teardown, untimed
    fn cleanup(&mut self) {}
}

/// Adapts a closure into a [`Workload`] with no setup or teardown
pub struct FnWorkload<F> {
    body: F,
}

impl<F> FnWorkload<F>
where
    F: FnMut(u64),
{
    /// Wrap `body`
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

impl<F> Workload for FnWorkload<F>
where
    F: FnMut(u64),
{
    fn run(&mut self, iterations: u64) {
        (self.body)(iterations)
    }
}

impl<W: Workload + ?Sized> Workload for Box<W> {
    fn initialize(&mut self) {
        (**self).initialize()
    }

    fn run(&mut self, iterations: u64) {
        (**self).run(iterations)
    }

    fn cleanup(&mut self) {
        (**self).cleanup()
    }
}
