//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - NDP message and table counters

mod logging;
mod metrics;

pub(crate) use logging::is_known_level;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{Counter, InterfaceStats, NdpMetrics, TableSizes};
