//! Integration tests for benchmp
//!
//! These tests fork real worker processes and verify the end-to-end behavior
//! of calibrated timing and multi-process orchestration.

use benchmp::workloads::Spin;
use benchmp::{
    BenchOptions, Calibration, FnWorkload, Forked, ForkSpawner, Sample, Spawner, SupervisorError,
    Workload, benchmark, benchmark_with, current, measure_in_process,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Forking runs share SIGCHLD handling and the current result
static FORK_LOCK: Mutex<()> = Mutex::new(());

fn fork_lock() -> MutexGuard<'static, ()> {
    FORK_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pinned calibration: 5 ms runs, no overhead corrections
fn pinned() -> Calibration {
    Calibration::fixed(5_000, 0, 0.0)
}

fn spin() -> Spin {
    Spin::new(Duration::from_micros(10))
}

fn process_gone(pid: libc::pid_t) -> bool {
    let ret = unsafe { libc::kill(pid, 0) };
    ret == -1 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("benchmp-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Single worker: the median per-iteration time tracks the spin unit
#[test]
fn test_single_worker_measures_spin() {
    let _guard = fork_lock();
    let options = BenchOptions {
        repetitions: 5,
        ..Default::default()
    };

    let report = benchmark(&mut spin(), &options, &pinned()).unwrap();
    let per_iteration = report.result.per_iteration_us();
    assert!(
        (10.0..25.0).contains(&per_iteration),
        "per-iteration {per_iteration} us"
    );
    assert_eq!(current(), report.result);
    assert_eq!(report.reported, 1);
    assert!(!report.is_degraded());
    // Alone, only runs long enough to trust are recorded
    for sample in report.ledger.samples() {
        assert!(sample.elapsed_us >= 4_750);
    }
}

/// Four workers timed together report every repetition
#[test]
fn test_parallel_workers_merge_reports() {
    let _guard = fork_lock();
    let calibration = pinned();
    let alone = benchmark(
        &mut spin(),
        &BenchOptions {
            repetitions: 3,
            ..Default::default()
        },
        &calibration,
    )
    .unwrap()
    .result;

    let options = BenchOptions {
        parallel: 4,
        repetitions: 3,
        ..Default::default()
    };
    let report = benchmark(&mut spin(), &options, &calibration).unwrap();

    assert_eq!(report.ledger.len(), 12);
    assert_eq!(report.reported, 4);
    assert!(report.hung.is_empty());
    assert_eq!(current(), report.result);

    // Every sample ran the same batch
    let batch = report.result.iterations;
    assert!(report.ledger.samples().iter().all(|s| s.iterations == batch));
    assert!(report.result.per_iteration_us() < 2.0 * alone.per_iteration_us());
}

/// Claims a role through marker files shared by every forked worker: the
/// first worker ever started is the baseline, the next one hangs forever.
struct HangOnce {
    dir: PathBuf,
    hang: bool,
}

impl HangOnce {
    fn claim(dir: &Path, name: &str) -> Option<std::fs::File> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(name))
            .ok()
    }
}

impl Workload for HangOnce {
    fn initialize(&mut self) {
        if Self::claim(&self.dir, "baseline").is_some() {
            return;
        }
        if let Some(mut marker) = Self::claim(&self.dir, "hanger") {
            let _ = write!(marker, "{}", std::process::id());
            self.hang = true;
        }
    }

    fn run(&mut self, iterations: u64) {
        while self.hang {
            std::thread::sleep(Duration::from_millis(50));
        }
        spin().run(iterations);
    }
}

/// A worker that never finishes is killed and left out of the result
#[test]
fn test_hung_worker_is_dropped() {
    let _guard = fork_lock();
    let dir = scratch_dir("hang");
    let options = BenchOptions {
        parallel: 3,
        repetitions: 3,
        timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let mut workload = HangOnce {
        dir: dir.clone(),
        hang: false,
    };

    let report = benchmark(&mut workload, &options, &pinned()).unwrap();
    assert!(report.is_degraded());
    assert_eq!(report.hung.len(), 1);
    assert_eq!(report.reported, 2);
    assert_eq!(report.ledger.len(), 6);
    assert!(report.result.elapsed_us > 0);

    let pid: libc::pid_t = std::fs::read_to_string(dir.join("hanger"))
        .unwrap()
        .parse()
        .unwrap();
    assert!(process_gone(pid));
    let _ = std::fs::remove_dir_all(&dir);
}

/// Forks real workers until `fail_at`, then refuses
struct FailingSpawner {
    fail_at: usize,
    pids: Vec<libc::pid_t>,
}

impl Spawner for FailingSpawner {
    fn spawn(&mut self, worker: usize) -> std::io::Result<Forked> {
        if worker == self.fail_at {
            return Err(std::io::Error::other("fork refused"));
        }
        let forked = ForkSpawner.spawn(worker)?;
        if let Forked::Parent(pid) = forked {
            self.pids.push(pid);
        }
        Ok(forked)
    }
}

/// A failed spawn reaps the workers already started and clears the result
#[test]
fn test_spawn_failure_reaps_started_workers() {
    let _guard = fork_lock();
    let mut spawner = FailingSpawner {
        fail_at: 2,
        pids: Vec::new(),
    };
    let options = BenchOptions {
        parallel: 5,
        repetitions: 3,
        ..Default::default()
    };

    let err = benchmark_with(&mut spin(), &options, &pinned(), &mut spawner).unwrap_err();
    assert!(matches!(err, SupervisorError::SpawnFailed { worker: 2, .. }));
    // Baseline worker plus the two started before the failure
    assert_eq!(spawner.pids.len(), 3);
    for &pid in &spawner.pids {
        assert!(process_gone(pid), "worker {pid} still exists");
    }
    assert_eq!(current(), Sample::EMPTY);
}

/// A worker that dies mid-protocol fails the run with its pid
#[test]
fn test_worker_death_is_reported() {
    let _guard = fork_lock();
    let mut workload = FnWorkload::new(|_| panic!("workload failed"));

    let err = benchmark(&mut workload, &BenchOptions::default(), &pinned()).unwrap_err();
    match err {
        SupervisorError::WorkerDied { pid } => assert!(process_gone(pid)),
        other => panic!("expected WorkerDied, got {other:?}"),
    }
    assert_eq!(current(), Sample::EMPTY);
}

/// A baseline that measures nothing stops the run before the workers fork
#[test]
fn test_empty_workload_is_unmeasurable() {
    let _guard = fork_lock();
    let mut workload = FnWorkload::new(|_| {});
    let options = BenchOptions {
        parallel: 2,
        ..Default::default()
    };

    let err = benchmark(&mut workload, &options, &pinned()).unwrap_err();
    assert!(matches!(err, SupervisorError::Unmeasurable));
    assert_eq!(current(), Sample::EMPTY);
}

/// In-process timing without forking
#[test]
fn test_in_process_measurement() {
    let _guard = fork_lock();
    let options = BenchOptions {
        repetitions: 3,
        ..Default::default()
    };

    let result = measure_in_process(&mut spin(), &options, &pinned());
    assert!(result.elapsed_us > 0);
    assert!(result.per_iteration_us() >= 10.0);
    assert_eq!(current(), result);
}
