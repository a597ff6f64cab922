//! The side channel for diagnostics.
//!
//! stdout belongs to the protocol. Everything else (log lines, panic
//! reports, backtraces) goes to stderr through `tracing`. Both functions
//! here are called once, before the server loop starts.

use std::backtrace::Backtrace;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::pipe::fault::panic_message;

/// Installs the global subscriber, writing to stderr.
pub fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Replaces the panic hook with one that reports through `tracing`.
///
/// The report carries the panic location, the panicking thread and at most
/// `backtrace_depth` backtrace frames; `0` disables backtrace capture. It is
/// the same for handler panics and panics anywhere else in the process.
pub fn install_panic_hook(backtrace_depth: usize) {
    std::panic::set_hook(Box::new(move |info| {
        let message = panic_message(info.payload());
        let location = info
            .location()
            .map_or_else(String::new, |l| format!("{}:{}", l.file(), l.line()));

        let current = std::thread::current();
        let thread = current.name().unwrap_or("<unnamed>");

        if backtrace_depth == 0 {
            tracing::error!(%location, reason = %message, thread, "Panic");
            return;
        }

        let backtrace = truncate_backtrace(&Backtrace::force_capture().to_string(), backtrace_depth);
        tracing::error!(%location, reason = %message, thread, %backtrace, "Panic");
    }));
}

/// Keeps the first `depth` frames of a rendered backtrace.
///
/// Frames start with a line of the form `  N: symbol`; the `at file:line`
/// lines that follow belong to the same frame.
fn truncate_backtrace(rendered: &str, depth: usize) -> String {
    let mut frames = 0;
    let mut kept = Vec::new();

    for line in rendered.lines() {
        if is_frame_header(line) {
            frames += 1;
            if frames > depth {
                kept.push("      ...");
                break;
            }
        }
        kept.push(line);
    }

    kept.join("\n")
}

fn is_frame_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(':')
}
