//! Worker Process State Machine
//!
//! Each forked worker runs its workload in batches. Between batches it calls
//! [`WorkerState::next_interval`], which records the batch that just finished
//! and returns the size of the next one. The worker walks through three
//! phases:
//!
//! ```text
//! Warmup ──start token──▶ Timing ──repetitions done──▶ Cooldown ──result request──▶ report, exit
//! ```
//!
//! A SIGTERM at any point makes the worker clean up and leave.

use crate::Workload;
use crate::calibration::Calibration;
use crate::ledger::Ledger;
use crate::measure::Timer;
use crate::timing::{Growth, adjust, clamp_us, next_iterations};
use benchmp_ipc::{ChannelError, WorkerEnds, WorkerMessage, WorkerReport};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Global flag set by SIGTERM handler to request graceful shutdown.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if a graceful shutdown has been requested via SIGTERM.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Clear the shutdown flag inherited from the parent across `fork(2)`
fn clear_shutdown_request() {
    SHUTDOWN_REQUESTED.store(false, Ordering::Relaxed);
}

/// Install a SIGTERM handler that sets the `SHUTDOWN_REQUESTED` flag.
/// The handler is async-signal-safe (only sets an atomic).
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

/// Undo the supervisor's SIGCHLD setup in a freshly forked child
fn reset_child_signals() {
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGCHLD);
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
    }
}

/// Errors that end a worker early
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Talking to the supervisor failed
    #[error("IPC error: {0}")]
    Channel(#[from] ChannelError),
}

/// How a worker talks to its supervisor.
///
/// Implemented for the pipe ends handed to a forked worker; tests drive the
/// state machine through an in-memory fake.
pub trait WorkerLink {
    /// Send one message to the supervisor
    fn send(&mut self, message: &WorkerMessage) -> Result<(), ChannelError>;

    /// Consume a start token if one is waiting, without blocking
    fn poll_start(&mut self) -> Result<bool, ChannelError>;

    /// Consume a result-request token if one is waiting, without blocking
    fn poll_result_request(&mut self) -> Result<bool, ChannelError>;

    /// Block until the exit token arrives
    fn wait_exit(&mut self) -> Result<(), ChannelError>;

    /// Whether the worker has been asked to stop
    fn stop_requested(&self) -> bool {
        shutdown_requested()
    }
}

impl WorkerLink for WorkerEnds {
    fn send(&mut self, message: &WorkerMessage) -> Result<(), ChannelError> {
        self.responses.send(message)
    }

    fn poll_start(&mut self) -> Result<bool, ChannelError> {
        self.start.try_recv()
    }

    fn poll_result_request(&mut self) -> Result<bool, ChannelError> {
        self.results.try_recv()
    }

    fn wait_exit(&mut self) -> Result<(), ChannelError> {
        self.exit.recv()
    }
}

/// Worker protocol phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Running untimed batches until released
    Warmup,
    /// Recording samples
    Timing,
    /// Running untimed batches until results are requested
    Cooldown,
}

/// What the worker should do after an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run the workload for this many iterations
    Run(u64),
    /// Report sent: clean up, then wait for the exit token
    Finish,
    /// Shutdown requested: clean up and leave immediately
    Abort,
}

/// Fixed parameters of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Index of this worker among its siblings
    pub worker: u32,
    /// Target run length in µs
    pub enough: u64,
    /// Iterations per timed run
    pub iterations: u64,
    /// Iterations per untimed warmup or cooldown batch
    pub batch: u64,
    /// Number of sibling workers, including this one
    pub parallel: usize,
    /// Samples to record before cooling down
    pub repetitions: usize,
}

/// Per-worker protocol state
#[derive(Debug)]
pub struct WorkerState<'c> {
    config: WorkerConfig,
    calibration: &'c Calibration,
    phase: Phase,
    iterations: u64,
    last_run: u64,
    ready_sent: bool,
    completed: usize,
    ledger: Ledger,
    timer: Timer,
}

impl<'c> WorkerState<'c> {
    /// Fresh state in the warmup phase
    pub fn new(config: WorkerConfig, calibration: &'c Calibration) -> Self {
        Self {
            config,
            calibration,
            phase: Phase::Warmup,
            iterations: config.iterations.max(1),
            last_run: config.iterations.max(1),
            ready_sent: false,
            completed: 0,
            ledger: Ledger::new(config.repetitions),
            timer: Timer::start(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Iterations per timed run (may be regrown when running alone)
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Samples recorded so far
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Restart the interval clock
    pub fn restart_clock(&mut self) {
        self.timer = Timer::start();
    }

    /// Close the interval that just ran and decide what comes next.
    pub fn next_interval<L: WorkerLink>(&mut self, link: &mut L) -> Result<Step, WorkerError> {
        let raw = self.timer.stop();

        if link.stop_requested() {
            return Ok(Step::Abort);
        }

        let ran = self.last_run;
        let result = adjust(raw, ran, self.calibration);

        let next = match self.phase {
            Phase::Warmup => self.warmup(link)?,
            Phase::Timing => self.timing(link, result, ran)?,
            Phase::Cooldown => {
                if link.poll_result_request()? {
                    link.send(&WorkerMessage::Report(WorkerReport {
                        worker: self.config.worker,
                        samples: self.ledger.samples().to_vec(),
                    }))?;
                    return Ok(Step::Finish);
                }
                self.config.batch
            }
        };

        self.last_run = next;
        self.timer = Timer::start();
        Ok(Step::Run(next))
    }

    fn warmup<L: WorkerLink>(&mut self, link: &mut L) -> Result<u64, WorkerError> {
        if !self.ready_sent {
            link.send(&WorkerMessage::Ready {
                worker: self.config.worker,
            })?;
            self.ready_sent = true;
        }

        if link.poll_start()? {
            tracing::trace!(worker = self.config.worker, "entering timed interval");
            self.phase = Phase::Timing;
            return Ok(self.iterations);
        }
        Ok(self.config.batch)
    }

    fn timing<L: WorkerLink>(
        &mut self,
        link: &mut L,
        result: f64,
        ran: u64,
    ) -> Result<u64, WorkerError> {
        let enough = self.config.enough;

        // With siblings contending, every interval counts; alone, only runs
        // that were long enough to trust.
        if self.config.parallel > 1 || result > 0.95 * enough as f64 {
            self.ledger.insert(clamp_us(result), ran);
            self.completed += 1;
            if self.completed >= self.config.repetitions {
                self.phase = Phase::Cooldown;
            }
        }

        if self.config.parallel == 1 {
            match next_iterations(result, self.iterations, enough) {
                Growth::Keep => {}
                Growth::Rescale(n) | Growth::Multiply(n) => self.iterations = n,
                Growth::GiveUp => self.phase = Phase::Cooldown,
            }
        }

        if self.phase == Phase::Cooldown {
            link.send(&WorkerMessage::Done {
                worker: self.config.worker,
                repetitions: self.completed as u32,
            })?;
            return Ok(self.config.batch);
        }
        Ok(self.iterations)
    }
}

/// Drive `workload` through the protocol until it reports or is told to stop.
///
/// Cleanup runs exactly once on every path out, including errors.
pub fn run_worker<W, L>(
    workload: &mut W,
    state: &mut WorkerState<'_>,
    link: &mut L,
) -> Result<(), WorkerError>
where
    W: Workload + ?Sized,
    L: WorkerLink,
{
    workload.initialize();
    state.restart_clock();

    loop {
        match state.next_interval(link) {
            Ok(Step::Run(iterations)) => workload.run(iterations),
            Ok(Step::Finish) => {
                workload.cleanup();
                return match link.wait_exit() {
                    // Supervisor gone: nothing left to wait for
                    Ok(()) | Err(ChannelError::Closed) => Ok(()),
                    Err(e) => Err(e.into()),
                };
            }
            Ok(Step::Abort) => {
                workload.cleanup();
                return Ok(());
            }
            Err(e) => {
                workload.cleanup();
                return Err(e);
            }
        }
    }
}

/// Body of a forked worker process; never returns.
///
/// Exit status is 0 after a normal exit or shutdown, 1 after a protocol
/// error and 2 if the workload panicked.
pub fn worker_process_main<W>(
    workload: &mut W,
    config: WorkerConfig,
    calibration: &Calibration,
    mut link: WorkerEnds,
) -> !
where
    W: Workload + ?Sized,
{
    reset_child_signals();
    clear_shutdown_request();
    install_sigterm_handler();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut state = WorkerState::new(config, calibration);
        run_worker(workload, &mut state, &mut link)
    }));

    let code = match outcome {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            tracing::warn!(worker = config.worker, error = %e, "worker failed");
            1
        }
        Err(_) => 2,
    };

    drop(link);
    // Leave without running atexit handlers inherited from the parent
    unsafe { libc::_exit(code) }
}
