//! Supervisor Process
//!
//! Forks the worker processes of a run, walks them through the
//! ready / start / done / report / exit handshake and merges their ledgers.
//!
//! Every path out of a run closes the supervisor's pipe ends and reaps every
//! worker, escalating to SIGKILL when a worker does not leave on its own.

use benchmp_core::{
    Calibration, Ledger, SHORT, Sample, WorkerConfig, Workload, measure_calibrated, reset_current,
    worker_process_main,
};
use benchmp_ipc::{ChannelError, SupervisorEnds, WorkerMessage, WorkerReport, control_channels};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest single wait on the response channel
const POLL_SLICE: Duration = Duration::from_secs(1);

/// Interval between non-blocking reap attempts
const REAP_POLL: Duration = Duration::from_millis(5);

/// How long a closed response pipe waits for its writer to become reapable
const EXIT_SETTLE: Duration = Duration::from_secs(1);

/// Ways a multi-process run can fail
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The single-worker baseline measured no time at all
    #[error("Workload is too fast to measure")]
    Unmeasurable,

    /// Process creation failed
    #[error("Failed to spawn worker {worker}: {source}")]
    SpawnFailed {
        /// Index of the worker that could not be created
        worker: usize,
        /// Underlying `fork(2)` error
        #[source]
        source: std::io::Error,
    },

    /// A control channel failed
    #[error("IPC error: {0}")]
    Channel(#[from] ChannelError),

    /// A worker exited while it was still expected to run
    #[error("Worker process {pid} died")]
    WorkerDied {
        /// Process id of the dead worker
        pid: i32,
    },

    /// A barrier's deadline passed
    #[error("Timeout waiting for workers ({phase})")]
    Timeout {
        /// Barrier that timed out
        phase: &'static str,
    },

    /// A worker sent a message the current phase does not allow
    #[error("Worker protocol error: expected {expected}, got {got}")]
    ProtocolError {
        /// Message the phase was waiting for
        expected: &'static str,
        /// What arrived instead
        got: &'static str,
    },
}

/// Parameters of one benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchOptions {
    /// Requested run length in µs; the calibrated `enough` wins if longer
    pub enough: u64,
    /// Number of worker processes
    pub parallel: usize,
    /// Time between the ready barrier and the start broadcast, in µs
    pub warmup: u64,
    /// Samples each worker records
    pub repetitions: usize,
    /// Bound on each barrier; derived from `enough` when unset
    pub timeout: Option<Duration>,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            enough: 0,
            parallel: 1,
            warmup: 0,
            repetitions: benchmp_core::TRIES,
            timeout: None,
        }
    }
}

/// Merged outcome of a run
#[derive(Debug, Clone)]
pub struct BenchReport {
    /// Median of all reported samples; also the published current result
    pub result: Sample,
    /// Every reported sample
    pub ledger: Ledger,
    /// Workers whose report was merged
    pub reported: usize,
    /// Workers terminated for not finishing in time
    pub hung: Vec<u32>,
}

impl BenchReport {
    /// Whether some workers were dropped from the result
    pub fn is_degraded(&self) -> bool {
        !self.hung.is_empty()
    }
}

/// Which side of a fork we are on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forked {
    /// The new worker process
    Child,
    /// The supervisor, with the worker's pid
    Parent(libc::pid_t),
}

/// Process creation seam
pub trait Spawner {
    /// Create the process for worker `worker`
    fn spawn(&mut self, worker: usize) -> std::io::Result<Forked>;
}

/// Creates workers with `fork(2)`
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkSpawner;

impl Spawner for ForkSpawner {
    fn spawn(&mut self, _worker: usize) -> std::io::Result<Forked> {
        match unsafe { libc::fork() } {
            -1 => Err(std::io::Error::last_os_error()),
            0 => Ok(Forked::Child),
            pid => Ok(Forked::Parent(pid)),
        }
    }
}

/// How long to wait for a worker to exit before SIGKILL
pub fn reap_timeout(enough: u64) -> Duration {
    let enough_secs = enough / 1_000_000;
    Duration::from_secs((2 * enough_secs + 2).max(5))
}

/// Default bound on each barrier
pub fn default_phase_timeout(enough: u64, repetitions: usize) -> Duration {
    let per_run = enough.max(SHORT);
    reap_timeout(enough) + Duration::from_micros(per_run.saturating_mul(2 * repetitions as u64))
}

// ─── SIGCHLD ────────────────────────────────────────────────────────────────

static CHILD_EXITED: AtomicBool = AtomicBool::new(false);

extern "C" fn sigchld_handler(_sig: libc::c_int) {
    CHILD_EXITED.store(true, Ordering::Relaxed);
}

/// Whether a child exited since the last call
fn take_child_exited() -> bool {
    CHILD_EXITED.swap(false, Ordering::Relaxed)
}

/// Installs the SIGCHLD flag handler and blocks SIGCHLD while workers are
/// forked; restores both on drop.
struct SigchldGuard {
    previous_action: libc::sigaction,
    previous_mask: libc::sigset_t,
    blocked: bool,
}

impl SigchldGuard {
    fn install() -> Self {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGCHLD);
            let mut previous_mask: libc::sigset_t = std::mem::zeroed();
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous_mask);

            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = sigchld_handler as *const () as usize;
            sa.sa_flags = libc::SA_RESTART | libc::SA_NOCLDSTOP;
            libc::sigemptyset(&mut sa.sa_mask);
            let mut previous_action: libc::sigaction = std::mem::zeroed();
            libc::sigaction(libc::SIGCHLD, &sa, &mut previous_action);

            CHILD_EXITED.store(false, Ordering::Relaxed);
            Self {
                previous_action,
                previous_mask,
                blocked: true,
            }
        }
    }

    fn unblock(&mut self) {
        if self.blocked {
            unsafe {
                libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous_mask, std::ptr::null_mut());
            }
            self.blocked = false;
        }
    }
}

impl Drop for SigchldGuard {
    fn drop(&mut self) {
        self.unblock();
        unsafe {
            libc::sigaction(libc::SIGCHLD, &self.previous_action, std::ptr::null_mut());
        }
    }
}

// ─── Worker processes ───────────────────────────────────────────────────────

/// Send a signal to a process. Returns `Err` if the signal could not be delivered.
fn send_signal(pid: libc::pid_t, signal: libc::c_int) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid, signal) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Worker process handle
#[derive(Debug)]
struct WorkerHandle {
    index: u32,
    pid: libc::pid_t,
    reaped: bool,
}

impl WorkerHandle {
    /// Reap the worker if it has exited; never blocks
    fn try_reap(&mut self) -> bool {
        if self.reaped {
            return true;
        }
        let mut status = 0;
        let ret = unsafe { libc::waitpid(self.pid, &mut status, libc::WNOHANG) };
        if ret == self.pid || ret == -1 {
            // -1: already collected elsewhere (ECHILD)
            self.reaped = true;
        }
        self.reaped
    }

    /// Check if worker process is still running
    fn is_alive(&mut self) -> bool {
        !self.try_reap()
    }

    /// SIGKILL and wait
    fn kill(&mut self) {
        if self.reaped {
            return;
        }
        let _ = send_signal(self.pid, libc::SIGKILL);
        let mut status = 0;
        unsafe {
            libc::waitpid(self.pid, &mut status, 0);
        }
        self.reaped = true;
    }
}

/// All workers of one run
#[derive(Debug)]
struct WorkerPool {
    workers: Vec<WorkerHandle>,
    reap_timeout: Duration,
}

impl WorkerPool {
    fn new(reap_timeout: Duration) -> Self {
        Self {
            workers: Vec::new(),
            reap_timeout,
        }
    }

    fn push(&mut self, index: usize, pid: libc::pid_t) {
        self.workers.push(WorkerHandle {
            index: index as u32,
            pid,
            reaped: false,
        });
    }

    /// Pid of a worker that exited while it was still expected to run
    fn find_dead(&mut self) -> Option<libc::pid_t> {
        self.workers
            .iter_mut()
            .filter(|w| !w.reaped)
            .find_map(|w| (!w.is_alive()).then_some(w.pid))
    }

    /// Like [`find_dead`](Self::find_dead), but gives a worker that just
    /// closed its pipe ends up to `grace` to become reapable.
    fn find_dead_within(&mut self, grace: Duration) -> Option<libc::pid_t> {
        let deadline = Instant::now() + grace;
        loop {
            if let Some(pid) = self.find_dead() {
                return Some(pid);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(REAP_POLL);
        }
    }

    /// Kill and reap one worker by index
    fn kill(&mut self, index: u32) {
        if let Some(worker) = self.workers.iter_mut().find(|w| w.index == index) {
            tracing::warn!(worker = index, pid = worker.pid, "killing unresponsive worker");
            worker.kill();
        }
    }

    /// Ask every live worker to shut down
    fn terminate(&mut self) {
        for worker in self.workers.iter_mut().filter(|w| !w.reaped) {
            let _ = send_signal(worker.pid, libc::SIGTERM);
        }
    }

    /// Wait for every worker, escalating to SIGKILL past the reap timeout
    fn reap(&mut self) {
        let grace = self.reap_timeout;
        for worker in self.workers.iter_mut() {
            let deadline = Instant::now() + grace;
            while !worker.try_reap() {
                if Instant::now() >= deadline {
                    tracing::warn!(
                        worker = worker.index,
                        pid = worker.pid,
                        "worker did not exit, sending SIGKILL"
                    );
                    worker.kill();
                    break;
                }
                std::thread::sleep(REAP_POLL);
            }
        }
    }

    fn all_reaped(&self) -> bool {
        self.workers.iter().all(|w| w.reaped)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.all_reaped() {
            self.terminate();
            self.reap();
        }
    }
}

// ─── Orchestration ──────────────────────────────────────────────────────────

/// Resolved parameters of one multi-process run
#[derive(Debug, Clone, Copy)]
struct RunPlan {
    enough: u64,
    iterations: u64,
    batch: u64,
    parallel: usize,
    repetitions: usize,
    warmup: Duration,
    phase_timeout: Duration,
}

impl RunPlan {
    fn worker_config(&self, worker: usize) -> WorkerConfig {
        WorkerConfig {
            worker: worker as u32,
            enough: self.enough,
            iterations: self.iterations,
            batch: self.batch,
            parallel: self.parallel,
            repetitions: self.repetitions,
        }
    }
}

/// Run `workload` across `options.parallel` forked workers.
pub fn benchmark<W>(
    workload: &mut W,
    options: &BenchOptions,
    calibration: &Calibration,
) -> Result<BenchReport, SupervisorError>
where
    W: Workload + ?Sized,
{
    benchmark_with(workload, options, calibration, &mut ForkSpawner)
}

/// [`benchmark`] with an explicit process spawner.
///
/// On failure the current result is left at `(0, 1)`.
pub fn benchmark_with<W, S>(
    workload: &mut W,
    options: &BenchOptions,
    calibration: &Calibration,
    spawner: &mut S,
) -> Result<BenchReport, SupervisorError>
where
    W: Workload + ?Sized,
    S: Spawner + ?Sized,
{
    reset_current();
    let outcome = run(workload, options, calibration, spawner);
    if let Err(e) = &outcome {
        tracing::warn!(error = %e, "benchmark run failed");
        reset_current();
    }
    outcome
}

fn run<W, S>(
    workload: &mut W,
    options: &BenchOptions,
    calibration: &Calibration,
    spawner: &mut S,
) -> Result<BenchReport, SupervisorError>
where
    W: Workload + ?Sized,
    S: Spawner + ?Sized,
{
    // Calibrate once here so forked workers inherit the values
    calibration.prime();
    let enough = calibration.get_enough(options.enough);
    let parallel = options.parallel.max(1);
    let repetitions = options.repetitions.max(1);

    let mut iterations = 1;
    if parallel > 1 {
        let baseline_options = BenchOptions {
            parallel: 1,
            ..*options
        };
        let baseline = run(workload, &baseline_options, calibration, spawner)?.result;
        if baseline.elapsed_us == 0 {
            return Err(SupervisorError::Unmeasurable);
        }

        iterations = baseline.iterations;
        if enough < SHORT {
            let scaled = SHORT as u128 * baseline.iterations as u128 / baseline.elapsed_us as u128;
            iterations = scaled.min(u64::MAX as u128) as u64 + 1;
        }
        tracing::debug!(
            baseline_us = baseline.elapsed_us,
            baseline_iterations = baseline.iterations,
            iterations,
            "single-worker baseline"
        );
    }

    let plan = RunPlan {
        enough,
        iterations,
        batch: iterations,
        parallel,
        repetitions,
        warmup: Duration::from_micros(options.warmup),
        phase_timeout: options
            .timeout
            .unwrap_or_else(|| default_phase_timeout(enough, repetitions)),
    };
    run_workers(workload, calibration, spawner, &plan)
}

fn run_workers<W, S>(
    workload: &mut W,
    calibration: &Calibration,
    spawner: &mut S,
    plan: &RunPlan,
) -> Result<BenchReport, SupervisorError>
where
    W: Workload + ?Sized,
    S: Spawner + ?Sized,
{
    let (mut ends, worker_ends) = control_channels()?;
    let mut sigchld = SigchldGuard::install();
    let mut pool = WorkerPool::new(reap_timeout(plan.enough));

    let mut spawned = Ok(());
    for index in 0..plan.parallel {
        match spawner.spawn(index) {
            Ok(Forked::Child) => {
                drop(ends);
                worker_process_main(workload, plan.worker_config(index), calibration, worker_ends);
            }
            Ok(Forked::Parent(pid)) => pool.push(index, pid),
            Err(source) => {
                spawned = Err(SupervisorError::SpawnFailed {
                    worker: index,
                    source,
                });
                break;
            }
        }
    }
    drop(worker_ends);
    sigchld.unblock();
    tracing::debug!(workers = pool.workers.len(), "forked workers");

    let outcome = spawned.and_then(|()| coordinate(&mut ends, &mut pool, plan));
    if outcome.is_err() {
        pool.terminate();
    }
    // Closing our ends unblocks workers waiting on a token
    drop(ends);
    pool.reap();
    drop(sigchld);
    outcome
}

/// Read frames until `on_message` reports completion or `deadline` passes.
///
/// Frames already waiting when the deadline passes are still delivered.
fn await_messages<F>(
    ends: &mut SupervisorEnds,
    pool: &mut WorkerPool,
    phase: &'static str,
    deadline: Instant,
    mut on_message: F,
) -> Result<(), SupervisorError>
where
    F: FnMut(WorkerMessage) -> Result<bool, SupervisorError>,
{
    loop {
        if take_child_exited() {
            if let Some(pid) = pool.find_dead() {
                return Err(SupervisorError::WorkerDied { pid });
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match ends.responses.poll_message(remaining.min(POLL_SLICE)) {
            Ok(Some(message)) => {
                if on_message(message)? {
                    return Ok(());
                }
                continue;
            }
            Ok(None) => {}
            Err(ChannelError::Closed) => {
                // EOF can beat the writer's exit status
                return Err(match pool.find_dead_within(EXIT_SETTLE) {
                    Some(pid) => SupervisorError::WorkerDied { pid },
                    None => SupervisorError::Channel(ChannelError::Closed),
                });
            }
            Err(e) => return Err(e.into()),
        }

        if Instant::now() >= deadline {
            return Err(SupervisorError::Timeout { phase });
        }
    }
}

/// Synchronization points every worker must pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Barrier {
    /// Worker initialized and is warming up
    Ready,
    /// Worker recorded its samples and is cooling down
    Done,
}

impl Barrier {
    fn phase(self) -> &'static str {
        match self {
            Barrier::Ready => "ready",
            Barrier::Done => "done",
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Barrier::Ready => "Ready",
            Barrier::Done => "Done",
        }
    }

    /// Worker index if `message` is this barrier's message
    fn sender(self, message: &WorkerMessage) -> Option<u32> {
        match (self, message) {
            (Barrier::Ready, WorkerMessage::Ready { worker })
            | (Barrier::Done, WorkerMessage::Done { worker, .. }) => Some(*worker),
            _ => None,
        }
    }
}

/// Wait until every worker in `pending` passed `barrier`
fn await_barrier(
    ends: &mut SupervisorEnds,
    pool: &mut WorkerPool,
    barrier: Barrier,
    pending: &mut BTreeSet<u32>,
    deadline: Instant,
) -> Result<(), SupervisorError> {
    await_messages(ends, pool, barrier.phase(), deadline, |message| {
        let Some(worker) = barrier.sender(&message) else {
            return Err(SupervisorError::ProtocolError {
                expected: barrier.expected(),
                got: message.kind(),
            });
        };
        if !pending.remove(&worker) {
            return Err(SupervisorError::ProtocolError {
                expected: barrier.expected(),
                got: "message from unexpected worker",
            });
        }
        Ok(pending.is_empty())
    })
}

fn coordinate(
    ends: &mut SupervisorEnds,
    pool: &mut WorkerPool,
    plan: &RunPlan,
) -> Result<BenchReport, SupervisorError> {
    let all: BTreeSet<u32> = (0..plan.parallel as u32).collect();

    let mut pending = all.clone();
    let deadline = Instant::now() + plan.phase_timeout;
    await_barrier(ends, pool, Barrier::Ready, &mut pending, deadline)?;
    tracing::debug!(workers = plan.parallel, "all workers ready");

    if !plan.warmup.is_zero() {
        std::thread::sleep(plan.warmup);
    }
    ends.start.send(plan.parallel)?;
    tracing::debug!("released workers into timed interval");

    let mut pending = all.clone();
    let deadline = Instant::now() + plan.phase_timeout;
    let mut hung = Vec::new();
    match await_barrier(ends, pool, Barrier::Done, &mut pending, deadline) {
        Ok(()) => {}
        Err(SupervisorError::Timeout { .. }) if pending.len() < plan.parallel => {
            for &worker in &pending {
                pool.kill(worker);
            }
            hung = pending.iter().copied().collect();
        }
        Err(e) => return Err(e),
    }
    let finished: BTreeSet<u32> = all.difference(&pending).copied().collect();
    tracing::debug!(finished = finished.len(), hung = hung.len(), "timed interval complete");

    let mut ledger = Ledger::new(plan.parallel * plan.repetitions);
    let mut reported = BTreeSet::new();
    for _ in 0..finished.len() {
        ends.results.send(1)?;
        let report = await_report(ends, pool, &hung, Instant::now() + plan.phase_timeout)?;
        if !finished.contains(&report.worker) || !reported.insert(report.worker) {
            return Err(SupervisorError::ProtocolError {
                expected: "Report",
                got: "report from unexpected worker",
            });
        }
        ledger.merge(&report.samples);
    }

    if let Err(e) = ends.exit.send(plan.parallel) {
        tracing::warn!(error = %e, "failed to broadcast exit");
    }

    let result = ledger.median();
    tracing::debug!(
        elapsed_us = result.elapsed_us,
        iterations = result.iterations,
        samples = ledger.len(),
        "merged worker reports"
    );
    Ok(BenchReport {
        result,
        ledger,
        reported: reported.len(),
        hung,
    })
}

/// Wait for the next report; late `Done` frames from `hung` workers are dropped.
fn await_report(
    ends: &mut SupervisorEnds,
    pool: &mut WorkerPool,
    hung: &[u32],
    deadline: Instant,
) -> Result<WorkerReport, SupervisorError> {
    let mut received = None;
    await_messages(ends, pool, "report", deadline, |message| match message {
        WorkerMessage::Report(report) => {
            received = Some(report);
            Ok(true)
        }
        WorkerMessage::Done { worker, .. } if hung.contains(&worker) => {
            tracing::debug!(worker, "discarding late completion from terminated worker");
            Ok(false)
        }
        other => Err(SupervisorError::ProtocolError {
            expected: "Report",
            got: other.kind(),
        }),
    })?;
    received.ok_or(SupervisorError::Timeout { phase: "report" })
}

/// Time `workload` in the calling process, without forking.
///
/// Sizes the run against the calibrated `enough`, then keeps the fastest of
/// `options.repetitions` runs.
pub fn measure_in_process<W>(
    workload: &mut W,
    options: &BenchOptions,
    calibration: &Calibration,
) -> Sample
where
    W: Workload + ?Sized,
{
    reset_current();
    let floor = Calibration::fixed(
        calibration.get_enough(options.enough),
        calibration.timing_overhead(),
        calibration.loop_overhead(),
    );

    workload.initialize();
    if options.warmup > 0 {
        let until = Instant::now() + Duration::from_micros(options.warmup);
        while Instant::now() < until {
            workload.run(1);
        }
    }
    let result = measure_calibrated(
        &mut |n| workload.run(n),
        options.repetitions.max(1),
        &floor,
    );
    workload.cleanup();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reap_timeout() {
        assert_eq!(reap_timeout(5_000), Duration::from_secs(5));
        assert_eq!(reap_timeout(1_000_000), Duration::from_secs(5));
        assert_eq!(reap_timeout(3_000_000), Duration::from_secs(8));
    }

    #[test]
    fn test_default_phase_timeout() {
        // enough below SHORT is measured against SHORT
        assert_eq!(
            default_phase_timeout(5_000, 11),
            Duration::from_secs(5) + Duration::from_micros(50_000 * 22)
        );
    }

    #[test]
    fn test_default_options() {
        let options = BenchOptions::default();
        assert_eq!(options.parallel, 1);
        assert_eq!(options.repetitions, 11);
        assert!(options.timeout.is_none());
    }

    fn two_worker_plan(phase_timeout: Duration) -> RunPlan {
        RunPlan {
            enough: 5_000,
            iterations: 10,
            batch: 10,
            parallel: 2,
            repetitions: 1,
            warmup: Duration::ZERO,
            phase_timeout,
        }
    }

    #[test]
    fn test_late_done_is_degraded_not_fatal() {
        let (mut ends, mut worker) = control_channels().unwrap();

        // Worker 1 finishes only after the done barrier gave up on it
        let workers = std::thread::spawn(move || {
            worker.responses.send(&WorkerMessage::Ready { worker: 0 }).unwrap();
            worker.responses.send(&WorkerMessage::Ready { worker: 1 }).unwrap();
            worker
                .responses
                .send(&WorkerMessage::Done {
                    worker: 0,
                    repetitions: 1,
                })
                .unwrap();
            std::thread::sleep(Duration::from_millis(600));
            worker
                .responses
                .send(&WorkerMessage::Done {
                    worker: 1,
                    repetitions: 1,
                })
                .unwrap();
            worker.results.recv().unwrap();
            worker
                .responses
                .send(&WorkerMessage::Report(WorkerReport {
                    worker: 0,
                    samples: vec![Sample::new(100, 10)],
                }))
                .unwrap();
            worker.exit.recv().unwrap();
        });

        let mut pool = WorkerPool::new(Duration::from_secs(5));
        let report =
            coordinate(&mut ends, &mut pool, &two_worker_plan(Duration::from_millis(400))).unwrap();
        workers.join().unwrap();

        assert_eq!(report.hung, vec![1]);
        assert_eq!(report.reported, 1);
        assert_eq!(report.result, Sample::new(100, 10));
    }

    #[test]
    fn test_buffered_frames_beat_the_deadline() {
        let (mut ends, mut worker) = control_channels().unwrap();
        worker.responses.send(&WorkerMessage::Ready { worker: 0 }).unwrap();
        worker.responses.send(&WorkerMessage::Ready { worker: 1 }).unwrap();

        // Deadline already passed, but both frames are waiting
        let mut pool = WorkerPool::new(Duration::from_secs(5));
        let mut pending: BTreeSet<u32> = [0, 1].into_iter().collect();
        await_barrier(&mut ends, &mut pool, Barrier::Ready, &mut pending, Instant::now()).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_report_degraded() {
        let report = BenchReport {
            result: Sample::EMPTY,
            ledger: Ledger::new(1),
            reported: 2,
            hung: vec![1],
        };
        assert!(report.is_degraded());
    }
}
