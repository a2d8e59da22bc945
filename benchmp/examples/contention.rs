//! Contention sweep
//!
//! Times one `getppid(2)` per iteration with 1, 2 and 4 workers running
//! concurrently, then a pointer chase in the calling process.
//!
//! Run with:
//!   cargo run --release --example contention
//!   ENOUGH=20000 cargo run --release --example contention   # pin the run length

use benchmp::prelude::*;
use benchmp::workloads::Chase;
use std::hint::black_box;

fn main() {
    let calibration = Calibration::global();

    for parallel in [1, 2, 4] {
        let mut workload = FnWorkload::new(|n| {
            for _ in 0..n {
                black_box(unsafe { libc::getppid() });
            }
        });
        let options = BenchOptions {
            parallel,
            ..Default::default()
        };
        match benchmark(&mut workload, &options, calibration) {
            Ok(report) => {
                let label = format!("getppid x{parallel}");
                if let Some(line) = format::micro(&label, report.result.iterations) {
                    println!("{line}");
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    let result = measure_in_process(&mut Chase::default(), &BenchOptions::default(), calibration);
    if let Some(line) = format::nano("pointer chase", result.iterations * 10) {
        println!("{line}");
    }
}
