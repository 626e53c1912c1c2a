use crate::Cli;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

pub const INTERVAL_DEFAULT: u64 = 5;
pub const INTERVAL_MIN: u64 = 1;
pub const INTERVAL_MAX: u64 = 60 * 60;
pub const ITERATION_MAX: u32 = 666;
pub const FAILURE_DEFAULT: u32 = 5;
pub const FAILURE_MAX: u32 = 100;
pub const BLOCK_SIZE_MAX: usize = 32 * 1024 * 1024;

/// The numeric command-line options that go through bounds validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFlag {
    Sleep,
    Count,
    MaxFailures,
    BlockSize,
}

impl NumericFlag {
    /// Short flag as typed on the command line.
    pub fn short(self) -> char {
        match self {
            NumericFlag::Sleep => 's',
            NumericFlag::Count => 'c',
            NumericFlag::MaxFailures => 'f',
            NumericFlag::BlockSize => 'b',
        }
    }

    fn description(self) -> &'static str {
        match self {
            NumericFlag::Sleep => "sleep time",
            NumericFlag::Count => "max iterations",
            NumericFlag::MaxFailures => "max consecutive write failures",
            NumericFlag::BlockSize => "write block size",
        }
    }

    /// Accepted values, inclusive on both ends.
    pub fn bounds(self) -> RangeInclusive<i64> {
        match self {
            NumericFlag::Sleep => INTERVAL_MIN as i64..=INTERVAL_MAX as i64,
            NumericFlag::Count => 1..=ITERATION_MAX as i64,
            NumericFlag::MaxFailures => 0..=FAILURE_MAX as i64,
            NumericFlag::BlockSize => 0..=BLOCK_SIZE_MAX as i64,
        }
    }
}

/// Rejected command-line input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    OutOfRange { flag: NumericFlag, value: i64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::OutOfRange { flag, value } => {
                let bounds = flag.bounds();
                write!(
                    f,
                    "Invalid {}: {} (-{} must be within [{}, {}])",
                    flag.description(),
                    value,
                    flag.short(),
                    bounds.start(),
                    bounds.end()
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Validated settings for one run. Built once before any file I/O and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub filename: PathBuf,
    pub interval_secs: u64,
    pub max_iterations: u32,
    /// 0 disables the limit.
    pub max_consecutive_failures: u32,
    /// 0 writes the iteration index as `"{n}\n"` instead of a fixed block.
    pub block_size: usize,
    pub exclusive_lock: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            filename: PathBuf::new(),
            interval_secs: INTERVAL_DEFAULT,
            max_iterations: ITERATION_MAX,
            max_consecutive_failures: FAILURE_DEFAULT,
            block_size: 0,
            exclusive_lock: false,
        }
    }
}

impl RunConfig {
    /// Validate parsed CLI arguments into a run configuration.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        Ok(Self {
            filename: cli.filename.clone(),
            interval_secs: bounded(NumericFlag::Sleep, cli.sleep)?,
            max_iterations: bounded(NumericFlag::Count, cli.count)?,
            max_consecutive_failures: bounded(NumericFlag::MaxFailures, cli.max_failures)?,
            block_size: bounded(NumericFlag::BlockSize, cli.block_size)?,
            exclusive_lock: cli.lock,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn bounded<T: TryFrom<i64>>(flag: NumericFlag, value: i64) -> Result<T, ConfigError> {
    if !flag.bounds().contains(&value) {
        return Err(ConfigError::OutOfRange { flag, value });
    }
    T::try_from(value).map_err(|_| ConfigError::OutOfRange { flag, value })
}
