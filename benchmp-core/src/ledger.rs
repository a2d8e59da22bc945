//! Result Ledger
//!
//! A bounded collection of samples kept sorted by time per iteration, slowest
//! first. The last entry is therefore the fastest (highest throughput) sample,
//! which is what [`Ledger::minimum`] reports.

use crate::current::set_current;
use benchmp_ipc::Sample;
use std::cmp::Ordering;

/// Compare two samples by time per iteration without going through floats.
#[inline]
fn cmp_per_iteration(a: &Sample, b: &Sample) -> Ordering {
    let lhs = a.elapsed_us as u128 * b.iterations as u128;
    let rhs = b.elapsed_us as u128 * a.iterations as u128;
    lhs.cmp(&rhs)
}

/// Bounded, sorted set of (elapsed, iterations) samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    capacity: usize,
    samples: Vec<Sample>,
}

impl Ledger {
    /// Create an empty ledger holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Remove every sample
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Insert a sample, keeping the slowest-first order.
    ///
    /// Samples with zero time or zero iterations carry no information and
    /// are ignored. When the ledger is full the slowest entry is evicted, so
    /// the fastest `capacity` samples are retained. Returns whether the
    /// sample was kept.
    pub fn insert(&mut self, elapsed_us: u64, iterations: u64) -> bool {
        if elapsed_us == 0 || iterations == 0 || self.capacity == 0 {
            return false;
        }

        let sample = Sample::new(elapsed_us, iterations);
        let mut position = self
            .samples
            .iter()
            .position(|existing| cmp_per_iteration(&sample, existing) == Ordering::Greater)
            .unwrap_or(self.samples.len());

        if self.samples.len() >= self.capacity {
            if position == 0 {
                // Slower than everything retained
                return false;
            }
            self.samples.remove(0);
            position -= 1;
        }

        self.samples.insert(position, sample);
        true
    }

    /// Insert an already-built sample
    #[inline]
    pub fn insert_sample(&mut self, sample: Sample) -> bool {
        self.insert(sample.elapsed_us, sample.iterations)
    }

    /// Insert every sample of another ledger or report
    pub fn merge(&mut self, samples: &[Sample]) {
        for sample in samples {
            self.insert_sample(*sample);
        }
    }

    /// Fastest sample, or `(0, 1)` when empty. Does not touch the current result.
    pub fn min_sample(&self) -> Sample {
        self.samples.last().copied().unwrap_or(Sample::EMPTY)
    }

    /// Positional median, or `(0, 1)` when empty. Does not touch the current result.
    ///
    /// With an even count the two middle samples are averaged field by field.
    pub fn median_sample(&self) -> Sample {
        let n = self.samples.len();
        if n == 0 {
            return Sample::EMPTY;
        }

        let mid = n / 2;
        if n % 2 == 1 {
            return self.samples[mid];
        }

        let (a, b) = (self.samples[mid - 1], self.samples[mid]);
        let avg = |x: u64, y: u64| ((x as u128 + y as u128) / 2) as u64;
        Sample::new(avg(a.elapsed_us, b.elapsed_us), avg(a.iterations, b.iterations))
    }

    /// Fastest sample; also published as the process-wide current result.
    pub fn minimum(&self) -> Sample {
        let sample = self.min_sample();
        set_current(sample);
        sample
    }

    /// Median sample; also published as the process-wide current result.
    pub fn median(&self) -> Sample {
        let sample = self.median_sample();
        set_current(sample);
        sample
    }

    /// Samples in ledger order (slowest first)
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample is held
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
