//! Structured logging, built on `slog` + `sloggers`. Every component takes
//! a `Logger` handle rather than reaching for a global logger, so tests can
//! install a discarding logger without touching global state.

pub use slog::Logger;
pub use slog::{debug, error, info, o, trace, warn};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Build the default terminal logger used by the service binaries
/// (`gamerunner`, `authenticator`, `util`). Library crates never call this;
/// they accept a `Logger` from their caller.
pub fn init(level: Severity) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(Destination::Stderr);
    builder.build().expect("failed to build terminal logger")
}

/// A logger that discards everything, for unit tests that need a `Logger`
/// value but don't care about its output.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
