//! Structured logging configuration for RustyPush.
//!
//! Uses `tracing` with `tracing-subscriber` for configurable log levels
//! and structured output. Stdout carries protocol frames, so log output
//! always goes to stderr or to an append-only log file.
//!
//! ## Environment Variables
//!
//! - `RUSTYPUSH_LOG` or `RUST_LOG`: Set log level (e.g., `debug`, `rustypush=debug,reqwest=warn`)
//! - `RUSTYPUSH_LOG_FORMAT`: Set output format (`pretty`, `compact`, `json`)
//! - `RUSTYPUSH_LOG_FILE`: Append logs to this file instead of stderr
//!
//! ## Examples
//!
//! ```bash
//! # Debug logging for RustyPush, warn for everything else
//! RUSTYPUSH_LOG=rustypush_core=debug,warn rustypush serve
//!
//! # Keep the MCP client's stderr clean and log to a file
//! RUSTYPUSH_LOG_FILE=/tmp/rustypush.log rustypush serve
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, writer::BoxMakeWriter},
    prelude::*,
};

const DEFAULT_FILTER: &str = "rustypush=info,rustypush_core=info,warn";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable with colors and indentation
    #[default]
    Pretty,
    /// Compact single-line output
    Compact,
    /// JSON output for log aggregation
    Json,
}

impl LogFormat {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log filter directive (e.g., "debug", "rustypush_core=debug,reqwest=warn")
    pub filter: String,
    /// Output format
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr
    pub file: Option<PathBuf>,
    /// Include file/line in logs
    pub with_file: bool,
    /// Include target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Compact,
            file: None,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("RUSTYPUSH_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let format = lookup("RUSTYPUSH_LOG_FORMAT")
            .map(|s| LogFormat::from_str(&s))
            .unwrap_or(LogFormat::Compact);

        let file = lookup("RUSTYPUSH_LOG_FILE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Self {
            filter,
            format,
            file,
            ..Default::default()
        }
    }

    /// Create a debug configuration, keeping any log file from `self`.
    pub fn debug(self) -> Self {
        Self {
            filter: "rustypush=debug,rustypush_core=debug,info".to_string(),
            with_file: true,
            ..self
        }
    }

    fn make_writer(&self) -> BoxMakeWriter {
        if let Some(path) = &self.file {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => return BoxMakeWriter::new(Mutex::new(file)),
                Err(e) => {
                    eprintln!("rustypush: cannot open log file {}: {}", path.display(), e);
                }
            }
        }
        BoxMakeWriter::new(std::io::stderr)
    }
}

/// Initialize the global tracing subscriber.
///
/// This should be called once at the start of the program.
/// Subsequent calls will be ignored.
///
/// # Examples
///
/// ```rust,ignore
/// use rustypush_core::logging::{init, LogConfig};
///
/// // Use environment-based configuration
/// init(LogConfig::from_env());
///
/// // Or turn on debug output
/// init(LogConfig::from_env().debug());
/// ```
pub fn init(config: LogConfig) {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let writer = config.make_writer();
    // ANSI colors only make sense on an interactive stderr.
    let ansi = config.file.is_none();

    match config.format {
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_target(config.with_target),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_target(config.with_target),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .pretty()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_target(config.with_target),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("unknown"), LogFormat::Pretty);
    }

    #[test]
    fn test_config_defaults_without_env() {
        let config = LogConfig::from_lookup(lookup(&[]));
        assert_eq!(config.filter, DEFAULT_FILTER);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_config_prefers_rustypush_log_over_rust_log() {
        let config = LogConfig::from_lookup(lookup(&[
            ("RUSTYPUSH_LOG", "debug"),
            ("RUST_LOG", "trace"),
            ("RUSTYPUSH_LOG_FORMAT", "json"),
            ("RUSTYPUSH_LOG_FILE", "/tmp/push.log"),
        ]));
        assert_eq!(config.filter, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/push.log")));
    }

    #[test]
    fn test_debug_config_keeps_log_file() {
        let config = LogConfig::from_lookup(lookup(&[("RUSTYPUSH_LOG_FILE", "/tmp/push.log")])).debug();
        assert!(config.filter.contains("debug"));
        assert!(config.with_file);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/push.log")));
    }
}
