//! IPC Message Types
//!
//! Worker → supervisor traffic is archived with rkyv and framed (see
//! [`crate::framing`]). Supervisor → worker traffic is single-byte phase
//! tokens, one per worker, on dedicated channels.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// One measurement: `iterations` units of work took `elapsed_us` microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[repr(C, align(8))]
pub struct Sample {
    /// Elapsed wall-clock time in microseconds
    pub elapsed_us: u64,
    /// Number of iterations that took `elapsed_us`
    pub iterations: u64,
}

impl Sample {
    /// The "no data" sentinel: zero time over one iteration.
    pub const EMPTY: Sample = Sample {
        elapsed_us: 0,
        iterations: 1,
    };

    /// Create a new sample
    #[inline]
    pub const fn new(elapsed_us: u64, iterations: u64) -> Self {
        Self {
            elapsed_us,
            iterations,
        }
    }

    /// Microseconds per iteration
    #[inline]
    pub fn per_iteration_us(&self) -> f64 {
        self.elapsed_us as f64 / self.iterations.max(1) as f64
    }

    /// Whether this sample carries no timing information
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elapsed_us == 0
    }
}

impl Default for Sample {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A worker's full result ledger, sent once during harvest.
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerReport {
    /// Index of the reporting worker
    pub worker: u32,
    /// Recorded samples, in ledger order
    pub samples: Vec<Sample>,
}

/// Messages sent from worker to supervisor over the response channel
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Worker finished initialization and entered its warmup loop
    Ready {
        /// Worker index
        worker: u32,
    },

    /// Worker completed its timed interval and is idling in cooldown
    Done {
        /// Worker index
        worker: u32,
        /// Number of samples recorded during the timed interval
        repetitions: u32,
    },

    /// Worker's result ledger, in answer to a result request
    Report(WorkerReport),
}

impl WorkerMessage {
    /// Index of the worker that sent this message
    pub fn worker(&self) -> u32 {
        match self {
            WorkerMessage::Ready { worker } | WorkerMessage::Done { worker, .. } => *worker,
            WorkerMessage::Report(report) => report.worker,
        }
    }

    /// Short name used in protocol error messages
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::Ready { .. } => "Ready",
            WorkerMessage::Done { .. } => "Done",
            WorkerMessage::Report(_) => "Report",
        }
    }
}

/// Single-byte tokens written by the supervisor to release workers into the
/// next protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PhaseToken {
    /// Leave warmup and start the timed interval
    Start = b'S',
    /// Send the result ledger now
    ResultRequest = b'R',
    /// Run cleanup and terminate
    Exit = b'X',
}

impl PhaseToken {
    /// Wire representation
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Parse a token from its wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'S' => Some(PhaseToken::Start),
            b'R' => Some(PhaseToken::ResultRequest),
            b'X' => Some(PhaseToken::Exit),
            _ => None,
        }
    }
}
