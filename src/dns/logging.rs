//! Logging setup
//!
//! Library code logs through the `log` facade. The binary installs a
//! `tracing` fmt subscriber, which also picks up `log` records, filtered by
//! `RUST_LOG` when set and by the configured level otherwise.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log levels selectable from the command line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Minimum log level to output
    pub level: LogLevel,
    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
        }
    }
}

/// Filter from an explicit directive string, falling back to `level`
fn build_filter(directives: Option<&str>, level: LogLevel) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber.
///
/// Returns false if a subscriber was already installed, which is not an
/// error (tests install their own).
pub fn init_logging(config: &LoggerConfig) -> bool {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(directives.as_deref(), config.level);

    let init_result = if config.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    match init_result {
        Ok(()) => {
            tracing::debug!(
                level = config.level.as_str(),
                json = config.json_format,
                "Logging initialised"
            );
            true
        }
        Err(e) => {
            eprintln!("Warning: Tracing subscriber already initialized: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_filter_prefers_directives() {
        let filter = build_filter(Some("external_mdns=trace"), LogLevel::Warn);
        assert_eq!("external_mdns=trace", filter.to_string());

        let filter = build_filter(None, LogLevel::Warn);
        assert_eq!("warn", filter.to_string());
    }

    #[test]
    fn test_default_config() {
        let config = LoggerConfig::default();

        assert_eq!(LogLevel::Info, config.level);
        assert!(!config.json_format);
    }
}
