#![warn(missing_docs)]
//! # benchmp
//!
//! Self-calibrating micro-benchmark harness with multi-process contention runs.
//!
//! - **Self-calibration**: finds the shortest run length at which timing is
//!   linear, and the cost of reading the clock and of one empty loop iteration
//! - **Iteration growth**: scales the iteration count until one run lasts long
//!   enough, then keeps the fastest of several runs
//! - **Contention runs**: forks P workers that warm up together, run their
//!   timed intervals concurrently and cool down while stragglers finish
//! - **Pipe barriers**: four pipes carry ready / start / result / exit
//!   handshakes; reports are rkyv frames
//! - **Bounded waits**: every barrier has a deadline, and every forked worker
//!   is reaped on every path
//!
//! ## Quick Start
//!
//! ```ignore
//! use benchmp::prelude::*;
//!
//! let mut workload = FnWorkload::new(|n| {
//!     for _ in 0..n {
//!         std::hint::black_box(unsafe { libc::getppid() });
//!     }
//! });
//! let options = BenchOptions { parallel: 4, ..Default::default() };
//! benchmark(&mut workload, &options, Calibration::global())?;
//! if let Some(line) = format::micro("getppid", current().iterations) {
//!     println!("{line}");
//! }
//! ```

// Re-export core types
pub use benchmp_core::{
    Calibration, CalibrationOverrides, FnWorkload, Growth, Ledger, Mark, PointerChase, Sample,
    SHORT, TRIES, Timer, Workload, current, grow_to_enough, measure, measure_calibrated,
    next_iterations, reset_current,
};

// Re-export orchestration
pub use benchmp_cli::{
    BenchConfig, BenchOptions, BenchReport, ForkSpawner, Forked, IsolationMode, Spawner,
    SupervisorError, benchmark, benchmark_with, format, measure_in_process, workloads,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchOptions, Calibration, FnWorkload, Sample, Workload, benchmark, current, format,
        measure_in_process,
    };
}

/// Run the benchmp CLI.
///
/// Call this from a binary's `main()`:
/// ```ignore
/// fn main() {
///     benchmp::run().unwrap();
/// }
/// ```
pub use benchmp_cli::run;
