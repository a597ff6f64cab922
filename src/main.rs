//! parent-pipe: child-side stdio server
//!
//! Serves the bundled test handlers over stdin/stdout so a parent process
//! can exercise the protocol end to end.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};

use parent_pipe::config;
use parent_pipe::diagnostics::{init_tracing, install_panic_hook};
use parent_pipe::pipe::server::shutdown_signal;
use parent_pipe::pipe::PipeServer;
use parent_pipe::test_server::{self, TestState};

/// Line-delimited JSON command and RPC server for child processes.
///
/// Reads one JSON message per line from stdin and writes replies to stdout.
/// Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "parent-pipe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Entry point for the parent-pipe server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // stdout is the protocol channel from here on
    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));
    install_panic_hook(cfg.diagnostics.backtrace_depth);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        read_timeout_secs = ?cfg.transport.read_timeout_secs,
        "Starting parent-pipe server"
    );

    let mut server = PipeServer::stdio(test_server::registry(), TestState::default())
        .with_read_timeout(cfg.transport.read_timeout());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server.run_until(shutdown_signal())) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
