//! Process-wide stream sink.
//!
//! One fern dispatch to stderr, installed once at startup. The log file is
//! handled separately by `log_lifecycle` since it has to be detached and
//! reattached at runtime, which a global logger cannot do.

use anyhow::{Context, Result};
use log::{Level, LevelFilter};

/// Matches the `asctime` layout operators already grep their logs for
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `{timestamp} - {level} - {message}`, shared by the stream and file sinks
pub fn format_line(level: Level, message: &str) -> String {
    format!("{} - {} - {}", timestamp(), level, message)
}

pub fn init_stream_logger(level: LevelFilter) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("{} - {} - {}", timestamp(), record.level(), message))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .context("stream logger was already installed")?;
    Ok(())
}

/// Parse a level name from config or the command line, defaulting to INFO
pub fn parse_level(name: &str) -> LevelFilter {
    name.trim().parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_layout() {
        let line = format_line(Level::Error, "Failed to open serial connection.");
        let parts: Vec<&str> = line.splitn(3, " - ").collect();
        assert_eq!(parts.len(), 3);
        assert!(chrono::NaiveDateTime::parse_from_str(parts[0], "%Y-%m-%d %H:%M:%S,%3f").is_ok());
        assert_eq!(parts[1], "ERROR");
        assert_eq!(parts[2], "Failed to open serial connection.");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(parse_level("chatty"), LevelFilter::Info);
    }
}
