//! Process-wide "current result"
//!
//! The most recently published sample, read by reporting code after a run.

use benchmp_ipc::Sample;
use std::sync::{Mutex, PoisonError};

static CURRENT: Mutex<Sample> = Mutex::new(Sample::EMPTY);

/// Publish `sample` as the current result
pub fn set_current(sample: Sample) {
    *CURRENT.lock().unwrap_or_else(PoisonError::into_inner) = sample;
}

/// The most recently published result, `(0, 1)` if none
pub fn current() -> Sample {
    *CURRENT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reset the current result to the empty sentinel
pub fn reset_current() {
    set_current(Sample::EMPTY);
}

/// Serializes unit tests that publish to the slot
#[cfg(test)]
pub(crate) static TEST_SLOT: Mutex<()> = Mutex::new(());
