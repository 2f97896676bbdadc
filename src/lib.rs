//! ndisc - IPv6 Neighbor Discovery engine
//!
//! Address resolution, router and prefix discovery, Duplicate Address
//! Detection and Redirect handling (RFC 4861 / RFC 4862) for a small,
//! fixed-capacity TCP/IP stack. Packet I/O is left to the embedding stack.

pub mod config;
pub mod error;
pub mod ndp;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
