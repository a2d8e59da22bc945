//! Result Formatting
//!
//! Classic one-line renderings of a timing result. The free functions read
//! the process-wide current result; [`Elapsed`] formats an explicit one.
//! Every formatter returns `None` when the result time is zero.

use benchmp_core::current;

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;

/// A result's total elapsed time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    us: u64,
}

impl Elapsed {
    /// Elapsed time of the current result
    pub fn current() -> Self {
        Self::from_us(current().elapsed_us)
    }

    /// Wrap a time in microseconds
    pub fn from_us(us: u64) -> Self {
        Self { us }
    }

    fn secs(&self) -> Option<f64> {
        (self.us > 0).then(|| self.us as f64 / 1_000_000.0)
    }

    /// `"<label>: 0.1234 microseconds"` per operation
    pub fn micro(&self, label: &str, n: u64) -> Option<String> {
        let per = self.us as f64 / n.max(1) as f64;
        (per != 0.0).then(|| format!("{label}: {per:.4} microseconds"))
    }

    /// `"<label>: 12.34 nanoseconds"` per operation
    pub fn nano(&self, label: &str, n: u64) -> Option<String> {
        let per = self.us as f64 * 1000.0 / n.max(1) as f64;
        (per != 0.0).then(|| format!("{label}: {per:.2} nanoseconds"))
    }

    /// `"<label>: 12 milliseconds"` per operation, truncated
    pub fn milli(&self, label: &str, n: u64) -> Option<String> {
        let per = self.us / 1000 / n.max(1);
        (per != 0).then(|| format!("{label}: {per} milliseconds"))
    }

    /// `"<n> in 1.23 secs, 456 microseconds each"`
    pub fn ptime(&self, n: u64) -> Option<String> {
        let s = self.secs()?;
        let each = s * 1_000_000.0 / n.max(1) as f64;
        Some(format!("{n} in {s:.2} secs, {each:.0} microseconds each"))
    }

    /// Context-switch summary for `xfers` switches
    pub fn context(&self, xfers: u64) -> Option<String> {
        let s = self.secs()?;
        let each = s * 1_000_000.0 / xfers.max(1) as f64;
        Some(format!(
            "{xfers} context switches in {s:.2} secs, {each:.0} microsec/switch"
        ))
    }

    /// Transfer latency and rate for `xfers` transfers of `size` bytes
    pub fn latency(&self, xfers: u64, size: u64) -> Option<String> {
        let s = self.secs()?;
        let xfers = xfers.max(1);
        let mut line = if xfers > 1 {
            format!("{} {}KB xfers in {:.2} secs, ", xfers, size / 1024, s)
        } else {
            format!("{:.1}KB in ", size as f64 / KB)
        };

        let per_ms = s * 1000.0 / xfers as f64;
        let unit = if xfers > 1 { "/xfer" } else { "s" };
        if per_ms > 100.0 {
            line.push_str(&format!("{per_ms:.0} millisec{unit}, "));
        } else {
            line.push_str(&format!("{per_ms:.4} millisec{unit}, "));
        }

        let bytes = xfers as f64 * size as f64;
        if bytes / (MB * s) > 1.0 {
            line.push_str(&format!("{:.2} MB/sec", bytes / (MB * s)));
        } else {
            line.push_str(&format!("{:.2} KB/sec", bytes / (KB * s)));
        }
        Some(line)
    }

    /// Bandwidth of `bytes` moved per run, averaged over `times` runs
    pub fn bandwidth(&self, bytes: u64, times: u64, verbose: bool) -> Option<String> {
        let secs = self.secs()? / times.max(1) as f64;
        let mb = bytes as f64 / MB;
        let rate = mb / secs;
        if verbose {
            return Some(format!("{mb:.4} MB in {secs:.4} secs, {rate:.4} MB/sec"));
        }

        let size = if mb < 1.0 { format!("{mb:.6}") } else { format!("{mb:.2}") };
        let rate = if rate < 1.0 { format!("{rate:.6}") } else { format!("{rate:.2}") };
        Some(format!("{size} {rate}"))
    }

    /// `"12.34 MB/sec"` for `bytes` moved
    pub fn mb_per_sec(&self, bytes: u64) -> Option<String> {
        let s = self.secs()?;
        Some(format!("{:.2} MB/sec", bytes as f64 / s / MB))
    }

    /// `"1234 KB/sec"` for `bytes` moved
    pub fn kb_per_sec(&self, bytes: u64) -> Option<String> {
        let s = self.secs()?;
        Some(format!("{:.0} KB/sec", bytes as f64 / s / KB))
    }

    /// `"<MB> <µs per op>"` pair used for size sweeps
    pub fn micromb(&self, size: u64, n: u64) -> Option<String> {
        let per = self.us as f64 / n.max(1) as f64;
        if per == 0.0 {
            return None;
        }
        let mb = size as f64 / MB;
        if per >= 10.0 {
            Some(format!("{mb:.6} {per:.0}"))
        } else {
            Some(format!("{mb:.6} {per:.3}"))
        }
    }
}

/// [`Elapsed::micro`] of the current result
pub fn micro(label: &str, n: u64) -> Option<String> {
    Elapsed::current().micro(label, n)
}

/// [`Elapsed::nano`] of the current result
pub fn nano(label: &str, n: u64) -> Option<String> {
    Elapsed::current().nano(label, n)
}

/// [`Elapsed::milli`] of the current result
pub fn milli(label: &str, n: u64) -> Option<String> {
    Elapsed::current().milli(label, n)
}

/// [`Elapsed::ptime`] of the current result
pub fn ptime(n: u64) -> Option<String> {
    Elapsed::current().ptime(n)
}

/// [`Elapsed::context`] of the current result
pub fn context(xfers: u64) -> Option<String> {
    Elapsed::current().context(xfers)
}

/// [`Elapsed::latency`] of the current result
pub fn latency(xfers: u64, size: u64) -> Option<String> {
    Elapsed::current().latency(xfers, size)
}

/// [`Elapsed::bandwidth`] of the current result
pub fn bandwidth(bytes: u64, times: u64, verbose: bool) -> Option<String> {
    Elapsed::current().bandwidth(bytes, times, verbose)
}

/// [`Elapsed::mb_per_sec`] of the current result
pub fn mb_per_sec(bytes: u64) -> Option<String> {
    Elapsed::current().mb_per_sec(bytes)
}

/// [`Elapsed::kb_per_sec`] of the current result
pub fn kb_per_sec(bytes: u64) -> Option<String> {
    Elapsed::current().kb_per_sec(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_time_prints_nothing() {
        let zero = Elapsed::from_us(0);
        assert!(zero.micro("x", 1).is_none());
        assert!(zero.nano("x", 1).is_none());
        assert!(zero.milli("x", 1).is_none());
        assert!(zero.ptime(1).is_none());
        assert!(zero.context(1).is_none());
        assert!(zero.latency(1, 1).is_none());
        assert!(zero.bandwidth(1, 1, false).is_none());
        assert!(zero.mb_per_sec(1).is_none());
        assert!(zero.kb_per_sec(1).is_none());
    }

    #[test]
    fn test_per_operation_units() {
        let elapsed = Elapsed::from_us(2_500);
        assert_eq!(
            elapsed.micro("null call", 1000).as_deref(),
            Some("null call: 2.5000 microseconds")
        );
        assert_eq!(
            elapsed.nano("load", 1000).as_deref(),
            Some("load: 2500.00 nanoseconds")
        );
        assert_eq!(
            Elapsed::from_us(7_300_000).milli("fork", 2).as_deref(),
            Some("fork: 3650 milliseconds")
        );
        // Less than a millisecond each truncates to nothing
        assert!(elapsed.milli("fast", 1000).is_none());
    }

    #[test]
    fn test_ptime_and_context() {
        let elapsed = Elapsed::from_us(1_500_000);
        assert_eq!(
            elapsed.ptime(3).as_deref(),
            Some("3 in 1.50 secs, 500000 microseconds each")
        );
        assert_eq!(
            elapsed.context(1000).as_deref(),
            Some("1000 context switches in 1.50 secs, 1500 microsec/switch")
        );
    }

    #[test]
    fn test_rates() {
        let second = Elapsed::from_us(1_000_000);
        assert_eq!(second.mb_per_sec(3 * 1024 * 1024).as_deref(), Some("3.00 MB/sec"));
        assert_eq!(second.kb_per_sec(10 * 1024).as_deref(), Some("10 KB/sec"));
        assert_eq!(
            second.bandwidth(2 * 1024 * 1024, 2, false).as_deref(),
            Some("2.00 4.00")
        );
        assert_eq!(
            second.bandwidth(512 * 1024, 1, true).as_deref(),
            Some("0.5000 MB in 1.0000 secs, 0.5000 MB/sec")
        );
    }

    #[test]
    fn test_latency() {
        let elapsed = Elapsed::from_us(2_000_000);
        assert_eq!(
            elapsed.latency(4, 1024 * 1024).as_deref(),
            Some("4 1024KB xfers in 2.00 secs, 500 millisec/xfer, 2.00 MB/sec")
        );
        assert_eq!(
            Elapsed::from_us(1_000).latency(1, 512).as_deref(),
            Some("0.5KB in 1.0000 millisecs, 500.00 KB/sec")
        );
    }

    #[test]
    fn test_micromb() {
        assert_eq!(
            Elapsed::from_us(50).micromb(1024 * 1024, 2).as_deref(),
            Some("1.000000 25")
        );
        assert_eq!(
            Elapsed::from_us(5).micromb(1024 * 1024, 2).as_deref(),
            Some("1.000000 2.500")
        );
    }
}
