//! Human-readable run output.
//!
//! Progress and timing go to `out` (stdout in the binary), write errors to `err`
//! (stderr). Failing to print never interrupts the write loop.

use crate::config::RunConfig;
use crate::timing::IterationMeasurement;
use nix::errno::Errno;
use std::io::Write;

/// `errno N (description)` for an OS error, or the plain error text otherwise.
pub fn os_error_detail(e: &std::io::Error) -> String {
    match e.raw_os_error() {
        Some(code) => format!("errno {} ({})", code, Errno::from_raw(code).desc()),
        None => e.to_string(),
    }
}

/// Totals over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u32,
    pub full_writes: u32,
    pub short_writes: u32,
    pub failed_writes: u32,
    pub bytes_written: u64,
}

pub struct Reporter<O, E> {
    out: O,
    err: E,
}

impl Reporter<std::io::Stdout, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdout(), std::io::stderr())
    }
}

impl<O: Write, E: Write> Reporter<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self { out, err }
    }

    pub fn banner(&mut self, config: &RunConfig) {
        let _ = writeln!(self.out, "Filename: {}", config.filename.display());
        let _ = writeln!(
            self.out,
            "Exclusive lock: {}",
            if config.exclusive_lock { "on" } else { "off" }
        );
        let _ = writeln!(self.out, "Sleep after each write: {}", config.interval_secs);
        let _ = writeln!(self.out, "Max iterations: {}", config.max_iterations);
        let _ = writeln!(
            self.out,
            "Max consecutive write fails: {}",
            config.max_consecutive_failures
        );
        let _ = writeln!(self.out, "Write size: {}", config.block_size);
        let _ = self.out.flush();
    }

    pub fn writing(&mut self, iteration: u32, requested: usize) {
        let _ = writeln!(
            self.out,
            "\nWriting sequence {iteration} ({requested} bytes)"
        );
        let _ = self.out.flush();
    }

    pub fn write_failed(&mut self, error: &std::io::Error) {
        let _ = writeln!(self.err, "write() failed with {}", os_error_detail(error));
    }

    pub fn short_write(&mut self, written: usize, requested: usize) {
        let _ = writeln!(
            self.out,
            "write() returned {written} instead of {requested}. Interrupted?!!"
        );
    }

    pub fn timing(&mut self, m: &IterationMeasurement) {
        let _ = writeln!(
            self.out,
            "write() took approx {:.2} seconds (user: {:.2}; sys: {:.2})",
            m.wall.as_secs_f64(),
            m.user.as_secs_f64(),
            m.system.as_secs_f64()
        );
        let _ = self.out.flush();
    }

    pub fn summary(&mut self, summary: &LoopSummary) {
        let _ = writeln!(
            self.out,
            "\n{} iterations: {} full, {} short, {} failed; {} bytes written",
            summary.iterations,
            summary.full_writes,
            summary.short_writes,
            summary.failed_writes,
            summary.bytes_written
        );
        let _ = self.out.flush();
    }

    #[cfg(test)]
    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}
