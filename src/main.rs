mod buffer;
mod config;
mod failures;
mod report;
mod signals;
mod target;
mod timing;
mod writer;

use clap::Parser;
use config::{
    RunConfig, BLOCK_SIZE_MAX, FAILURE_DEFAULT, FAILURE_MAX, INTERVAL_DEFAULT, INTERVAL_MAX,
    INTERVAL_MIN, ITERATION_MAX,
};
use report::Reporter;
use signals::SignalHandler;
use std::path::PathBuf;
use std::process::ExitCode;
use writer::{LoopError, LoopOutcome, WriteLoop};

const EXAMPLES: &str = "\
Examples:
  timed-writer /mnt/myfile.txt
  timed-writer -s 5 -c 100 -l /mnt/myexclusive.txt
  timed-writer -s 1 -c 10 -f 2 -b 1048576 -l /mnt/megwrite.txt";

/// Writes a line to FILENAME with SLEEP seconds between writes, reporting how
/// long each synchronous write() took.
#[derive(Parser, Debug)]
#[command(
    name = "timed-writer",
    version,
    about,
    after_help = EXAMPLES,
    args_override_self = true
)]
pub struct Cli {
    #[arg(
        short = 's',
        long = "sleep",
        value_name = "SLEEP",
        default_value_t = INTERVAL_DEFAULT as i64,
        allow_negative_numbers = true,
        help = format!("Seconds to sleep after each write [bounds: {INTERVAL_MIN}..={INTERVAL_MAX}]"),
    )]
    sleep: i64,

    #[arg(
        short = 'c',
        long = "count",
        value_name = "MAX_ITER",
        default_value_t = ITERATION_MAX as i64,
        allow_negative_numbers = true,
        help = format!("Limit iterations to MAX_ITER [bounds: 1..={ITERATION_MAX}]"),
    )]
    count: i64,

    #[arg(
        short = 'f',
        long = "max-failures",
        value_name = "MAX_FAIL",
        default_value_t = FAILURE_DEFAULT as i64,
        allow_negative_numbers = true,
        help = format!("Limit consecutive write() failures to MAX_FAIL, 0 for unlimited [bounds: 0..={FAILURE_MAX}]"),
    )]
    max_failures: i64,

    #[arg(
        short = 'b',
        long = "block-size",
        value_name = "BLOCK_SIZE",
        default_value_t = 0,
        allow_negative_numbers = true,
        help = format!("Set write() size to BLOCK_SIZE; 0 writes the iteration's \"%d\\n\" [bounds: 0..={BLOCK_SIZE_MAX}]"),
    )]
    block_size: i64,

    /// Place an exclusive flock() on FILENAME for the whole run
    #[arg(short = 'l', long = "lock")]
    lock: bool,

    /// Debug logging to stderr (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    /// File to write (created or truncated)
    #[arg(value_name = "FILENAME")]
    filename: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "timed_writer=debug"
    } else {
        "timed_writer=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match RunConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config).await {
        Ok(LoopOutcome::Completed) => ExitCode::SUCCESS,
        Ok(LoopOutcome::Interrupted(signal)) => {
            eprintln!("Interrupted by {signal}, file closed");
            ExitCode::from(signals::exit_status(signal))
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Acquire the target, then run the write loop over it.
///
/// Signal handlers are installed only once the file is held, so an interrupt
/// while blocked on the lock still terminates the process the default way.
/// The file (and its lock) is closed when this returns, on every path.
async fn run(config: &RunConfig) -> Result<LoopOutcome, LoopError> {
    let mut reporter = Reporter::stdio();
    reporter.banner(config);

    let file = target::acquire(&config.filename, config.exclusive_lock)?;

    let shutdown = match SignalHandler::install() {
        Ok(handler) => handler.shutdown(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to install signal handlers");
            signals::Shutdown::channel().1
        }
    };

    let mut engine = WriteLoop::new(config, file, reporter);
    engine.run(shutdown).await
}
