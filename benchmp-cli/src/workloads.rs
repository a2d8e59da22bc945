//! Built-in workloads for the `benchmp` binary

use benchmp_core::{PointerChase, Workload};
use clap::ValueEnum;
use std::hint::black_box;
use std::time::{Duration, Instant};

/// Workloads selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkloadKind {
    /// Empty loop
    Null,
    /// Dependent pointer loads, ten per iteration
    Chase,
    /// One `getppid(2)` per iteration
    Syscall,
    /// Busy-wait for a fixed time per iteration
    Spin,
}

impl WorkloadKind {
    /// Label printed in front of the result
    pub fn label(self) -> &'static str {
        match self {
            WorkloadKind::Null => "null loop",
            WorkloadKind::Chase => "pointer chase",
            WorkloadKind::Syscall => "simple syscall",
            WorkloadKind::Spin => "spin",
        }
    }

    /// Operations performed by one iteration
    pub fn ops_per_iteration(self) -> u64 {
        match self {
            WorkloadKind::Chase => 10,
            _ => 1,
        }
    }

    /// Build the workload; `spin` is the busy-wait per iteration
    pub fn build(self, spin: Duration) -> Box<dyn Workload> {
        match self {
            WorkloadKind::Null => Box::new(NullLoop),
            WorkloadKind::Chase => Box::new(Chase::default()),
            WorkloadKind::Syscall => Box::new(Syscall),
            WorkloadKind::Spin => Box::new(Spin::new(spin)),
        }
    }
}

/// Loop with nothing in it
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLoop;

impl Workload for NullLoop {
    fn run(&mut self, iterations: u64) {
        for i in 0..iterations {
            black_box(i);
        }
    }
}

/// Self-referencing pointer loads; the cell is allocated in `initialize`
#[derive(Debug, Default)]
pub struct Chase {
    chase: Option<PointerChase>,
}

impl Workload for Chase {
    fn initialize(&mut self) {
        self.chase = Some(PointerChase::new());
    }

    fn run(&mut self, iterations: u64) {
        let chase = self.chase.get_or_insert_with(PointerChase::new);
        black_box(chase.ten(iterations));
    }

    fn cleanup(&mut self) {
        self.chase = None;
    }
}

/// Cheapest system call available
#[derive(Debug, Default, Clone, Copy)]
pub struct Syscall;

impl Workload for Syscall {
    fn run(&mut self, iterations: u64) {
        for _ in 0..iterations {
            black_box(unsafe { libc::getppid() });
        }
    }
}

/// Busy-waits `unit` per iteration on the monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct Spin {
    unit: Duration,
}

impl Spin {
    /// Spin for `unit` per iteration
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }
}

impl Workload for Spin {
    fn run(&mut self, iterations: u64) {
        let total = self.unit.saturating_mul(iterations.min(u32::MAX as u64) as u32);
        let start = Instant::now();
        while start.elapsed() < total {
            std::hint::spin_loop();
        }
    }
}
