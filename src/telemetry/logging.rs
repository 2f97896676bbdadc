//! Logging configuration and initialization.
//!
//! NDP state transitions are logged through `tracing` with structured
//! `interface` / address fields. This module installs the subscriber:
//! - `RUST_LOG` environment variable takes priority
//! - otherwise the `[log]` table of the config file
//! - output formats: pretty, compact, json

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// `[log]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: LogFormat,
    /// Emit span close events (json only)
    pub span_events: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            span_events: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter directive; unknown levels fall back to info
    fn directive(&self) -> String {
        parse_level(&self.level)
            .unwrap_or(Level::INFO)
            .as_str()
            .to_lowercase()
    }
}

/// Install the global `tracing` subscriber.
///
/// Returns `false` if a global subscriber was already installed (for
/// example by a test harness or the embedding application).
///
/// # Examples
///
/// ```ignore
/// let config = LogConfig { level: "debug".into(), ..LogConfig::default() };
/// init_logging(Some(&config));
/// ```
pub fn init_logging(config: Option<&LogConfig>) -> bool {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Some(cfg) = config {
        EnvFilter::new(cfg.directive())
    } else {
        EnvFilter::new("info")
    };

    let format = config.map(|c| c.format).unwrap_or_default();
    let span_events = config.is_some_and(|c| c.span_events);

    let installed = match format {
        LogFormat::Json => {
            let spans = if span_events {
                FmtSpan::CLOSE
            } else {
                FmtSpan::NONE
            };
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_span_events(spans));
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact());
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer());
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    installed.is_ok()
}

fn parse_level(level: &str) -> Option<Level> {
    level.trim().parse().ok()
}

/// Whether `level` names a known log level
pub(crate) fn is_known_level(level: &str) -> bool {
    parse_level(level).is_some()
}
