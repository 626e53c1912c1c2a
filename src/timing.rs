//! Wall-clock and process CPU time instrumentation around a single write.

use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::{TimeVal, TimeValLike};
use std::time::{Duration, Instant};

/// Process CPU time consumed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: Duration,
    pub system: Duration,
}

impl CpuTimes {
    /// Snapshot CPU usage of the current process.
    ///
    /// Falls back to zero if the kernel refuses `getrusage`, which only skews the
    /// reported deltas.
    pub fn now() -> Self {
        match getrusage(UsageWho::RUSAGE_SELF) {
            Ok(usage) => Self {
                user: timeval_to_duration(usage.user_time()),
                system: timeval_to_duration(usage.system_time()),
            },
            Err(e) => {
                tracing::debug!(error = %e, "getrusage failed");
                Self::default()
            }
        }
    }
}

fn timeval_to_duration(tv: TimeVal) -> Duration {
    Duration::from_micros(tv.num_microseconds().max(0) as u64)
}

/// Start point of a measured write.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    wall: Instant,
    cpu: CpuTimes,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            wall: Instant::now(),
            cpu: CpuTimes::now(),
        }
    }

    /// Close the measurement for a write that requested `requested` bytes.
    pub fn stop(self, requested: usize, written: Option<usize>) -> IterationMeasurement {
        let cpu = CpuTimes::now();
        IterationMeasurement {
            wall: self.wall.elapsed(),
            user: cpu.user.saturating_sub(self.cpu.user),
            system: cpu.system.saturating_sub(self.cpu.system),
            requested,
            written,
        }
    }
}

/// Timing and byte counts of one write call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationMeasurement {
    pub wall: Duration,
    pub user: Duration,
    pub system: Duration,
    pub requested: usize,
    /// `None` when the write call failed.
    pub written: Option<usize>,
}
