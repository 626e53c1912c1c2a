//! The write loop: build payload, write, measure, report, sleep, repeat.
//!
//! The loop ends in one of three ways: all iterations done, the consecutive
//! failure limit reached (an error), or a shutdown signal. In every case it
//! returns to the caller, which owns the file handle and closes it.

use crate::buffer::{PayloadOverflow, WriteBuffer};
use crate::config::RunConfig;
use crate::failures::{FailureDecision, FailurePolicy};
use crate::report::{os_error_detail, LoopSummary, Reporter};
use crate::signals::Shutdown;
use crate::target::TargetError;
use crate::timing::Stopwatch;
use nix::sys::signal::Signal;
use std::io::Write;
use tracing::{debug, info};

/// Result of a single write call.
#[derive(Debug)]
pub enum WriteOutcome {
    Full { written: usize },
    /// Fewer bytes than requested, without an error.
    Short { written: usize, requested: usize },
    Failed(std::io::Error),
}

impl WriteOutcome {
    fn classify(result: std::io::Result<usize>, requested: usize) -> Self {
        match result {
            Ok(written) if written == requested => WriteOutcome::Full { written },
            Ok(written) => WriteOutcome::Short { written, requested },
            Err(e) => WriteOutcome::Failed(e),
        }
    }
}

/// How a loop that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Every configured iteration ran.
    Completed,
    /// Stopped early by a signal.
    Interrupted(Signal),
}

/// Fatal errors that end a run.
#[derive(Debug)]
pub enum LoopError {
    /// Could not open or lock the target.
    Target(TargetError),
    /// Consecutive write failures reached the configured limit.
    FailureLimit {
        failures: u32,
        last: std::io::Error,
    },
    /// The iteration index did not fit the write buffer.
    Payload(PayloadOverflow),
}

impl std::fmt::Display for LoopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopError::Target(e) => write!(f, "{e}"),
            LoopError::FailureLimit { failures, last } => write!(
                f,
                "Reached max failcount ({} consecutive write failures, last: {}) ... bye!",
                failures,
                os_error_detail(last)
            ),
            LoopError::Payload(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LoopError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoopError::Target(e) => Some(e),
            LoopError::FailureLimit { last, .. } => Some(last),
            LoopError::Payload(e) => Some(e),
        }
    }
}

impl From<TargetError> for LoopError {
    fn from(e: TargetError) -> Self {
        LoopError::Target(e)
    }
}

impl From<PayloadOverflow> for LoopError {
    fn from(e: PayloadOverflow) -> Self {
        LoopError::Payload(e)
    }
}

/// Drives writes of the configured payload into `sink`.
pub struct WriteLoop<'a, W, O, E> {
    config: &'a RunConfig,
    sink: W,
    buffer: WriteBuffer,
    failures: FailurePolicy,
    reporter: Reporter<O, E>,
    summary: LoopSummary,
}

impl<'a, W: Write, O: Write, E: Write> WriteLoop<'a, W, O, E> {
    pub fn new(config: &'a RunConfig, sink: W, reporter: Reporter<O, E>) -> Self {
        Self {
            config,
            sink,
            buffer: WriteBuffer::new(config.block_size),
            failures: FailurePolicy::new(config.max_consecutive_failures),
            reporter,
            summary: LoopSummary::default(),
        }
    }

    /// Run every iteration, sleeping the configured interval between writes.
    ///
    /// A summary line is printed whichever way the loop ends.
    pub async fn run(&mut self, mut shutdown: Shutdown) -> Result<LoopOutcome, LoopError> {
        let result = self.run_iterations(&mut shutdown).await;
        self.reporter.summary(&self.summary);
        info!(
            iterations = self.summary.iterations,
            full = self.summary.full_writes,
            short = self.summary.short_writes,
            failed = self.summary.failed_writes,
            bytes = self.summary.bytes_written,
            "write loop finished"
        );
        result
    }

    async fn run_iterations(&mut self, shutdown: &mut Shutdown) -> Result<LoopOutcome, LoopError> {
        let max = self.config.max_iterations;
        let interval = self.config.interval();

        for iteration in 0..max {
            if let Some(signal) = shutdown.requested() {
                return Ok(LoopOutcome::Interrupted(signal));
            }

            self.iterate(iteration)?;

            if iteration + 1 < max {
                debug!(secs = interval.as_secs(), "sleeping");
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    signal = shutdown.wait() => return Ok(LoopOutcome::Interrupted(signal)),
                }
            }
        }

        Ok(LoopOutcome::Completed)
    }

    /// One write, classified and reported.
    fn iterate(&mut self, iteration: u32) -> Result<(), LoopError> {
        let payload = self.buffer.payload(iteration)?;
        let requested = payload.len();
        self.reporter.writing(iteration, requested);

        let watch = Stopwatch::start();
        let result = self.sink.write(payload);
        let measurement = watch.stop(requested, result.as_ref().ok().copied());

        self.summary.iterations += 1;
        debug!(
            iteration,
            requested,
            written = ?measurement.written,
            wall_secs = measurement.wall.as_secs_f64(),
            "write returned"
        );

        match WriteOutcome::classify(result, requested) {
            WriteOutcome::Failed(e) => {
                self.summary.failed_writes += 1;
                self.reporter.write_failed(&e);
                if let FailureDecision::Abort { failures } = self.failures.record_failure() {
                    return Err(LoopError::FailureLimit { failures, last: e });
                }
            }
            WriteOutcome::Short { written, requested } => {
                self.summary.short_writes += 1;
                self.summary.bytes_written += written as u64;
                self.failures.record_success();
                self.reporter.short_write(written, requested);
            }
            WriteOutcome::Full { written } => {
                self.summary.full_writes += 1;
                self.summary.bytes_written += written as u64;
                self.failures.record_success();
            }
        }

        self.reporter.timing(&measurement);
        Ok(())
    }

    #[cfg(test)]
    pub fn summary(&self) -> LoopSummary {
        self.summary
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (W, Reporter<O, E>) {
        (self.sink, self.reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::time::Duration;

    /// Sink that replays scripted results and records every write request.
    #[derive(Default)]
    struct ScriptedSink {
        script: VecDeque<Option<io::Result<usize>>>,
        requests: Vec<Vec<u8>>,
    }

    impl ScriptedSink {
        /// `None` entries (and an exhausted script) accept the whole write.
        fn new(script: Vec<Option<io::Result<usize>>>) -> Self {
            Self {
                script: script.into(),
                requests: Vec::new(),
            }
        }

        fn failing() -> Self {
            Self {
                script: (0..1000).map(|_| Some(Err(enospc()))).collect(),
                requests: Vec::new(),
            }
        }
    }

    impl Write for ScriptedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.requests.push(buf.to_vec());
            match self.script.pop_front().flatten() {
                Some(result) => result,
                None => Ok(buf.len()),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn enospc() -> io::Error {
        io::Error::from_raw_os_error(28)
    }

    fn config(iterations: u32, failures: u32, block_size: usize) -> RunConfig {
        RunConfig {
            filename: "mock".into(),
            interval_secs: 1,
            max_iterations: iterations,
            max_consecutive_failures: failures,
            block_size,
            exclusive_lock: false,
        }
    }

    async fn run_loop(
        config: &RunConfig,
        sink: ScriptedSink,
    ) -> (
        Result<LoopOutcome, LoopError>,
        LoopSummary,
        ScriptedSink,
        String,
        String,
    ) {
        let (_tx, shutdown) = Shutdown::channel();
        let mut engine = WriteLoop::new(config, sink, Reporter::new(Vec::new(), Vec::new()));
        let result = engine.run(shutdown).await;
        let summary = engine.summary();
        let (sink, reporter) = engine.into_parts();
        let (out, err) = reporter.into_inner();
        (
            result,
            summary,
            sink,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_mode_writes_index_lines() {
        let cfg = config(3, 5, 0);
        let (result, summary, sink, out, err) = run_loop(&cfg, ScriptedSink::default()).await;

        assert_eq!(result.unwrap(), LoopOutcome::Completed);
        assert_eq!(
            sink.requests,
            vec![b"0\n".to_vec(), b"1\n".to_vec(), b"2\n".to_vec()]
        );
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.full_writes, 3);
        assert_eq!(summary.bytes_written, 6);
        assert_eq!(out.matches("Writing sequence").count(), 3);
        assert_eq!(out.matches("write() took approx").count(), 3);
        assert!(out.contains("Writing sequence 2 (2 bytes)"));
        assert!(err.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_but_not_after_last_write() {
        let cfg = RunConfig {
            interval_secs: 10,
            ..config(4, 5, 0)
        };
        let start = tokio::time::Instant::now();
        let (result, ..) = run_loop(&cfg, ScriptedSink::default()).await;
        assert_eq!(result.unwrap(), LoopOutcome::Completed);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(31), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_iteration_does_not_sleep() {
        let cfg = config(1, 5, 0);
        let start = tokio::time::Instant::now();
        let (result, summary, ..) = run_loop(&cfg, ScriptedSink::default()).await;
        assert_eq!(result.unwrap(), LoopOutcome::Completed);
        assert_eq!(summary.iterations, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_mode_requests_exact_size() {
        let cfg = config(3, 5, 4096);
        let (result, summary, sink, ..) = run_loop(&cfg, ScriptedSink::default()).await;

        assert_eq!(result.unwrap(), LoopOutcome::Completed);
        assert!(sink.requests.iter().all(|r| r.len() == 4096));
        assert!(sink.requests[2].starts_with(b"2\n\r"));
        assert_eq!(summary.bytes_written, 3 * 4096);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_consecutive_failure_limit() {
        let cfg = config(5, 2, 0);
        let (result, summary, sink, _out, err) = run_loop(&cfg, ScriptedSink::failing()).await;

        let err_value = result.unwrap_err();
        assert!(matches!(
            err_value,
            LoopError::FailureLimit { failures: 2, .. }
        ));
        assert_eq!(sink.requests.len(), 2);
        assert_eq!(summary.failed_writes, 2);
        assert_eq!(err.matches("write() failed with errno 28").count(), 2);
        assert!(err_value.to_string().contains("Reached max failcount"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_failure_limit_never_stops() {
        let cfg = config(20, 0, 0);
        let (result, summary, sink, ..) = run_loop(&cfg, ScriptedSink::failing()).await;

        assert_eq!(result.unwrap(), LoopOutcome::Completed);
        assert_eq!(sink.requests.len(), 20);
        assert_eq!(summary.failed_writes, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_streak() {
        let cfg = config(6, 2, 0);
        let sink = ScriptedSink::new(vec![
            Some(Err(enospc())),
            None,
            Some(Err(enospc())),
            None,
            Some(Err(enospc())),
            None,
        ]);
        let (result, summary, ..) = run_loop(&cfg, sink).await;

        assert_eq!(result.unwrap(), LoopOutcome::Completed);
        assert_eq!(summary.failed_writes, 3);
        assert_eq!(summary.full_writes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_write_is_notice_and_resets_streak() {
        let cfg = config(4, 2, 100);
        let sink = ScriptedSink::new(vec![
            Some(Err(enospc())),
            Some(Ok(40)),
            Some(Err(enospc())),
            None,
        ]);
        let (result, summary, _sink, out, _err) = run_loop(&cfg, sink).await;

        assert_eq!(result.unwrap(), LoopOutcome::Completed);
        assert_eq!(summary.short_writes, 1);
        assert_eq!(summary.failed_writes, 2);
        assert_eq!(summary.bytes_written, 140);
        assert!(out.contains("write() returned 40 instead of 100. Interrupted?!!"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_configs_request_identical_sizes() {
        let cfg = config(12, 5, 0);
        let (_, _, first, ..) = run_loop(&cfg, ScriptedSink::default()).await;
        let (_, _, second, ..) = run_loop(&cfg, ScriptedSink::default()).await;
        let sizes = |s: &ScriptedSink| s.requests.iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(sizes(&first), sizes(&second));
        assert_eq!(sizes(&first)[9], 2);
        assert_eq!(sizes(&first)[10], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_start_writes_nothing() {
        let cfg = config(3, 5, 0);
        let (tx, shutdown) = Shutdown::channel();
        tx.send(Some(Signal::SIGINT)).unwrap();

        let mut engine = WriteLoop::new(
            &cfg,
            ScriptedSink::default(),
            Reporter::new(Vec::new(), Vec::new()),
        );
        let result = engine.run(shutdown).await;

        assert_eq!(result.unwrap(), LoopOutcome::Interrupted(Signal::SIGINT));
        assert_eq!(engine.summary().iterations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_sleep() {
        let cfg = config(10, 5, 0);
        let (tx, shutdown) = Shutdown::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let _ = tx.send(Some(Signal::SIGTERM));
        });

        let start = tokio::time::Instant::now();
        let mut engine = WriteLoop::new(
            &cfg,
            ScriptedSink::default(),
            Reporter::new(Vec::new(), Vec::new()),
        );
        let result = engine.run(shutdown).await;

        assert_eq!(result.unwrap(), LoopOutcome::Interrupted(Signal::SIGTERM));
        assert_eq!(engine.summary().iterations, 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_printed_on_failure() {
        let cfg = config(5, 1, 0);
        let (result, _, _, out, _) = run_loop(&cfg, ScriptedSink::failing()).await;
        assert!(result.is_err());
        assert!(out.contains("1 iterations: 0 full, 0 short, 1 failed; 0 bytes written"));
    }
}
