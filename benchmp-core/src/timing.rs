//! Single-Process Timing Loop
//!
//! Runs a workload body `n` times under the clock, growing `n` until one run
//! lasts long enough to trust, then repeats the run and keeps the fastest
//! overhead-corrected sample.

use crate::calibration::Calibration;
use crate::ledger::Ledger;
use crate::measure::Timer;
use benchmp_ipc::Sample;
use std::hint::black_box;

/// Iteration counts above this are abandoned
pub const MAX_ITERATIONS: u64 = 1 << 27;

/// A negative corrected time with more iterations than this is abandoned
pub const NEGATIVE_ITERATIONS_LIMIT: u64 = 1 << 20;

/// Below this many microseconds a run is too short to extrapolate from
const RESCALE_FLOOR_US: f64 = 150.0;

/// Outcome of one step of the iteration-growth policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// The run landed within `[0.99, 1.2] * enough`
    Keep,
    /// Extrapolate from the measured rate to ~1.1 × enough
    Rescale(u64),
    /// Too short to extrapolate, multiply by eight
    Multiply(u64),
    /// The workload cannot be timed meaningfully
    GiveUp,
}

impl Growth {
    /// Next iteration count, if the run should continue
    pub fn iterations(self, current: u64) -> Option<u64> {
        match self {
            Growth::Keep => Some(current),
            Growth::Rescale(n) | Growth::Multiply(n) => Some(n),
            Growth::GiveUp => None,
        }
    }
}

/// Decide the next iteration count after `iterations` runs produced a
/// corrected time of `result` microseconds against a target of `enough`.
pub fn next_iterations(result: f64, iterations: u64, enough: u64) -> Growth {
    let target = enough as f64;
    if result >= 0.99 * target && result <= 1.2 * target {
        return Growth::Keep;
    }

    if result > RESCALE_FLOOR_US {
        let scaled = iterations as f64 / result * 1.1 * target;
        return Growth::Rescale(scaled as u64 + 1);
    }

    let grown = iterations.saturating_mul(8);
    if grown > MAX_ITERATIONS || (result < 0.0 && grown > NEGATIVE_ITERATIONS_LIMIT) {
        Growth::GiveUp
    } else {
        Growth::Multiply(grown)
    }
}

/// Subtract the calibrated clock and loop overhead from a raw measurement.
///
/// The result may be negative when the overhead estimates exceed the
/// measured time.
pub fn adjust(raw_us: u64, iterations: u64, calibration: &Calibration) -> f64 {
    raw_us as f64
        - (calibration.timing_overhead() as f64 + iterations as f64 * calibration.loop_overhead())
}

/// Clamp a corrected time to the non-negative microseconds a sample stores
#[inline]
pub fn clamp_us(result: f64) -> u64 {
    if result > 0.0 { result as u64 } else { 0 }
}

/// Grow `iterations` until one uncorrected run of `body` lasts at least
/// 95% of `enough`, returning that run.
///
/// `iterations` keeps its final value so repeated calls resume where the
/// previous one stopped. If the growth policy gives up, the returned sample
/// has zero elapsed time.
pub fn grow_to_enough<F>(body: &mut F, iterations: &mut u64, enough: u64) -> Sample
where
    F: FnMut(u64),
{
    let floor = 0.95 * enough as f64;
    loop {
        let ran = (*iterations).max(1);
        let timer = Timer::start();
        body(ran);
        let elapsed = timer.stop();

        let result = elapsed as f64;
        match next_iterations(result, ran, enough) {
            Growth::GiveUp => return Sample::new(0, ran),
            growth => {
                *iterations = growth.iterations(ran).unwrap_or(ran);
                if result >= floor {
                    return Sample::new(elapsed, ran);
                }
            }
        }
    }
}

/// Run `body(iterations)` `repetitions` times and return the fastest
/// corrected sample, publishing it as the current result.
pub fn measure<F>(
    body: &mut F,
    iterations: u64,
    repetitions: usize,
    calibration: &Calibration,
) -> Sample
where
    F: FnMut(u64),
{
    let mut ledger = Ledger::new(repetitions);
    for _ in 0..repetitions {
        let timer = Timer::start();
        body(iterations);
        let raw = timer.stop();
        ledger.insert(clamp_us(adjust(raw, iterations, calibration)), iterations);
    }
    ledger.minimum()
}

/// Size a run with [`grow_to_enough`] against the calibrated target, then
/// [`measure`] it.
pub fn measure_calibrated<F>(body: &mut F, repetitions: usize, calibration: &Calibration) -> Sample
where
    F: FnMut(u64),
{
    let mut iterations = 1;
    let sized = grow_to_enough(body, &mut iterations, calibration.enough());
    if sized.is_empty() {
        return Sample::EMPTY;
    }
    measure(body, sized.iterations, repetitions, calibration)
}

/// A heap cell holding its own address.
///
/// Following the pointer is a single dependent load that the optimizer
/// cannot remove, which makes it the reference unit of work for overhead
/// calibration.
#[derive(Debug)]
pub struct PointerChase {
    cell: Box<usize>,
}

impl PointerChase {
    /// Create a self-referential cell
    pub fn new() -> Self {
        let mut cell = Box::new(0usize);
        let addr = &*cell as *const usize as usize;
        *cell = addr;
        Self { cell }
    }

    #[inline(always)]
    fn step(p: *const usize) -> *const usize {
        // SAFETY: `p` always points at `cell`, which lives as long as `self`.
        unsafe { std::ptr::read_volatile(p) as *const usize }
    }

    fn chase(&self, iterations: u64, steps: usize) -> usize {
        let mut p = &*self.cell as *const usize;
        for _ in 0..iterations {
            for _ in 0..steps {
                p = Self::step(p);
            }
        }
        black_box(p) as usize
    }

    /// One dependent load per iteration
    pub fn one(&self, iterations: u64) -> usize {
        self.chase(iterations, 1)
    }

    /// Two dependent loads per iteration
    pub fn two(&self, iterations: u64) -> usize {
        self.chase(iterations, 2)
    }

    /// Ten dependent loads per iteration
    pub fn ten(&self, iterations: u64) -> usize {
        self.chase(iterations, 10)
    }
}

impl Default for PointerChase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current::{TEST_SLOT, current};
    use std::sync::PoisonError;

    #[test]
    fn test_growth_keeps_in_window() {
        assert_eq!(next_iterations(5000.0, 100, 5000), Growth::Keep);
        assert_eq!(next_iterations(4950.0, 100, 5000), Growth::Keep);
        assert_eq!(next_iterations(6000.0, 100, 5000), Growth::Keep);
    }

    #[test]
    fn test_growth_rescales_from_rate() {
        // 3000 us for 100 iterations, target 5000 -> 100/3000*1.1*5000 + 1
        assert_eq!(next_iterations(3000.0, 100, 5000), Growth::Rescale(184));
        // Too long also rescales, downwards
        assert_eq!(next_iterations(20_000.0, 1234, 5000), Growth::Rescale(340));
    }

    #[test]
    fn test_growth_multiplies_short_runs() {
        assert_eq!(next_iterations(10.0, 3, 5000), Growth::Multiply(24));
        assert_eq!(next_iterations(150.0, 1, 5000), Growth::Multiply(8));
    }

    #[test]
    fn test_growth_gives_up() {
        assert_eq!(next_iterations(1.0, 1 << 25, 5000), Growth::GiveUp);
        assert_eq!(next_iterations(1.0, 1 << 24, 5000), Growth::Multiply(1 << 27));
        assert_eq!(next_iterations(-3.0, 1 << 18, 5000), Growth::GiveUp);
        assert_eq!(next_iterations(-3.0, 1 << 17, 5000), Growth::Multiply(1 << 20));
    }

    #[test]
    fn test_adjust_and_clamp() {
        let calibration = Calibration::fixed(5000, 3, 0.5);
        assert_eq!(adjust(100, 10, &calibration), 92.0);
        assert_eq!(adjust(5, 10, &calibration), -3.0);
        assert_eq!(clamp_us(-3.0), 0);
        assert_eq!(clamp_us(92.7), 92);
    }

    #[test]
    fn test_grow_to_enough_reaches_target() {
        let chase = PointerChase::new();
        let mut iterations = 1;
        let sample = grow_to_enough(
            &mut |n| {
                chase.ten(n);
            },
            &mut iterations,
            2000,
        );

        assert!(sample.elapsed_us >= 1900, "{sample:?}");
        assert!(sample.iterations > 1);
        assert!(iterations >= 1);
    }

    #[test]
    fn test_grow_to_enough_gives_up_on_empty_body() {
        let mut iterations = 1;
        let sample = grow_to_enough(&mut |_| {}, &mut iterations, 10_000_000);
        assert!(sample.is_empty());
    }

    #[test]
    fn test_measure_returns_fastest() {
        let _guard = TEST_SLOT.lock().unwrap_or_else(PoisonError::into_inner);
        let calibration = Calibration::fixed(1000, 0, 0.0);
        let mut calls = 0u64;
        let sample = measure(
            &mut |n| {
                calls += 1;
                std::thread::sleep(std::time::Duration::from_micros(200 * n));
            },
            2,
            3,
            &calibration,
        );

        assert_eq!(calls, 3);
        assert_eq!(sample.iterations, 2);
        assert!(sample.elapsed_us >= 400);
        assert_eq!(current(), sample);
    }

    #[test]
    fn test_pointer_chase_returns_own_address() {
        let chase = PointerChase::new();
        let addr = chase.one(0);
        assert_eq!(chase.one(5), addr);
        assert_eq!(chase.two(5), addr);
        assert_eq!(chase.ten(5), addr);
    }
}
