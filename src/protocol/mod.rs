//! Wire formats used by Neighbor Discovery
//!
//! Link-layer addresses, IPv6 address helpers, ICMPv6 NDP messages and
//! their options.

pub mod icmpv6;
pub mod ipv6;
pub mod ndp_option;
pub mod types;

pub use types::*;
