//! Logging bootstrap for the binary.
//!
//! Log lines go to stderr so stdout carries only command output.

use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

const DEFAULT_LEVEL: &str = "warn";
const LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Pick the level: `-v` flags win over the configured level, which wins
/// over the default.
pub fn level(verbosity: u8, configured: Option<&str>) -> &'static str {
    match verbosity {
        0 => configured
            .and_then(|wanted| {
                LEVELS
                    .iter()
                    .copied()
                    .find(|level| level.eq_ignore_ascii_case(wanted.trim()))
            })
            .unwrap_or(DEFAULT_LEVEL),
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Start the logger. Keep the handle alive for the life of the process.
pub fn init(verbosity: u8, configured: Option<&str>) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_str(level(verbosity, configured))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
}
