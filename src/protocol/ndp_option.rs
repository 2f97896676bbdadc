//! NDP options - RFC 4861 §4.6, RFC 4191, RFC 8106, RFC 6775
//!
//! Every option is a TLV whose length byte counts 8-octet units,
//! header included:
//!
//! ```text
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |    Length     |              ...              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ~                              ...                              ~
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! A zero length or an option running past the end of the message makes the
//! whole option block invalid; callers drop the enclosing message.

use super::MacAddr;
use crate::{Error, Result};
use std::net::Ipv6Addr;

/// Options are sized in units of 8 octets
pub const OPTION_UNIT: usize = 8;

/// Prefix Information flag: on-link (L)
pub const PREFIX_FLAG_ON_LINK: u8 = 0x80;
/// Prefix Information flag: autonomous address configuration (A)
pub const PREFIX_FLAG_AUTONOMOUS: u8 = 0x40;
/// 6LoWPAN Context flag: valid for compression (C)
pub const CONTEXT_FLAG_COMPRESSION: u8 = 0x10;
/// 6LoWPAN Context identifier mask
pub const CONTEXT_ID_MASK: u8 = 0x0f;

const PREFIX_INFO_LEN: usize = 32;
const MTU_LEN: usize = 8;

/// NDP option types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NdpOptionType {
    SourceLinkLayerAddress = 1,
    TargetLinkLayerAddress = 2,
    PrefixInformation = 3,
    RedirectedHeader = 4,
    Mtu = 5,
    RouteInformation = 24,
    RecursiveDnsServer = 25,
    SixlowpanContext = 34,
}

impl NdpOptionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NdpOptionType::SourceLinkLayerAddress),
            2 => Some(NdpOptionType::TargetLinkLayerAddress),
            3 => Some(NdpOptionType::PrefixInformation),
            4 => Some(NdpOptionType::RedirectedHeader),
            5 => Some(NdpOptionType::Mtu),
            24 => Some(NdpOptionType::RouteInformation),
            25 => Some(NdpOptionType::RecursiveDnsServer),
            34 => Some(NdpOptionType::SixlowpanContext),
            _ => None,
        }
    }
}

/// Default router / route preference (RFC 4191 §2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RouterPreference {
    Low,
    #[default]
    Medium,
    High,
}

impl RouterPreference {
    /// Decode the 2-bit Prf field; the reserved value 10 reads as Medium
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b01 => RouterPreference::High,
            0b11 => RouterPreference::Low,
            _ => RouterPreference::Medium,
        }
    }

    pub fn to_bits(self) -> u8 {
        match self {
            RouterPreference::High => 0b01,
            RouterPreference::Medium => 0b00,
            RouterPreference::Low => 0b11,
        }
    }
}

/// Prefix Information option body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixInformation {
    pub prefix: Ipv6Addr,
    pub prefix_length: u8,
    pub on_link_flag: bool,
    pub autonomous_flag: bool,
    /// Seconds, 0xffffffff = infinity
    pub valid_lifetime: u32,
    /// Seconds, 0xffffffff = infinity
    pub preferred_lifetime: u32,
}

impl PrefixInformation {
    pub fn new(
        prefix: Ipv6Addr,
        prefix_length: u8,
        on_link_flag: bool,
        autonomous_flag: bool,
        valid_lifetime: u32,
        preferred_lifetime: u32,
    ) -> Self {
        Self {
            prefix,
            prefix_length,
            on_link_flag,
            autonomous_flag,
            valid_lifetime,
            preferred_lifetime,
        }
    }
}

/// Route Information option body (RFC 4191 §2.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInformation {
    pub prefix: Ipv6Addr,
    pub prefix_length: u8,
    pub preference: RouterPreference,
    pub route_lifetime: u32,
}

/// Recursive DNS Server option body (RFC 8106 §5.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveDnsServer {
    pub lifetime: u32,
    pub servers: Vec<Ipv6Addr>,
}

/// 6LoWPAN Context option body (RFC 6775 §4.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SixlowpanContext {
    pub context_length: u8,
    pub compression: bool,
    pub context_id: u8,
    /// Units of 60 seconds
    pub valid_lifetime: u16,
    pub prefix: Ipv6Addr,
}

/// A single decoded NDP option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdpOption {
    SourceLinkLayerAddress(MacAddr),
    TargetLinkLayerAddress(MacAddr),
    PrefixInformation(PrefixInformation),
    /// Leading bytes of the redirected packet
    RedirectedHeader(Vec<u8>),
    Mtu(u32),
    RouteInformation(RouteInformation),
    RecursiveDnsServer(RecursiveDnsServer),
    SixlowpanContext(SixlowpanContext),
    /// Unrecognized options are skipped (RFC 4861 §4.6)
    Unknown { kind: u8, length: u8 },
}

/// Parse a complete option block
///
/// Fails if any option is zero-length, truncated, or has a length that is
/// invalid for its type.
pub fn parse_options(buffer: &[u8]) -> Result<Vec<NdpOption>> {
    let mut options = Vec::new();
    let mut offset = 0;

    while offset < buffer.len() {
        if buffer.len() - offset < 2 {
            return Err(Error::Parse("truncated NDP option header".into()));
        }

        let units = buffer[offset + 1];
        if units == 0 {
            return Err(Error::Parse("zero-length NDP option".into()));
        }

        let len = units as usize * OPTION_UNIT;
        if offset + len > buffer.len() {
            return Err(Error::Parse("truncated NDP option".into()));
        }

        options.push(NdpOption::parse(&buffer[offset..offset + len])?);
        offset += len;
    }

    Ok(options)
}

/// Encode a sequence of options back to back
pub fn encode_options(options: &[NdpOption], out: &mut Vec<u8>) {
    for option in options {
        option.encode(out);
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Prefix field of variable length (Route Information, 6LoWPAN Context)
fn read_prefix(data: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    let n = data.len().min(16);
    octets[..n].copy_from_slice(&data[..n]);
    Ipv6Addr::from(octets)
}

fn read_addr(data: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&data[..16]);
    Ipv6Addr::from(octets)
}

impl NdpOption {
    /// Decode one option; `data` spans exactly the option, header included
    fn parse(data: &[u8]) -> Result<Self> {
        let kind = data[0];
        let units = data[1];
        let invalid = |what: &str| Error::Parse(format!("invalid {} option length", what));

        let option = match NdpOptionType::from_u8(kind) {
            // Only the one-unit Ethernet form is understood; longer link-layer
            // addresses are skipped like an unknown option
            Some(NdpOptionType::SourceLinkLayerAddress) if units == 1 => {
                NdpOption::SourceLinkLayerAddress(read_mac(data))
            }
            Some(NdpOptionType::TargetLinkLayerAddress) if units == 1 => {
                NdpOption::TargetLinkLayerAddress(read_mac(data))
            }
            Some(NdpOptionType::SourceLinkLayerAddress)
            | Some(NdpOptionType::TargetLinkLayerAddress) => NdpOption::Unknown {
                kind,
                length: units,
            },
            Some(NdpOptionType::PrefixInformation) => {
                if data.len() != PREFIX_INFO_LEN {
                    return Err(invalid("prefix information"));
                }
                let prefix_length = data[2];
                if prefix_length > 128 {
                    return Err(Error::Parse("prefix length exceeds 128".into()));
                }
                NdpOption::PrefixInformation(PrefixInformation {
                    prefix_length,
                    on_link_flag: data[3] & PREFIX_FLAG_ON_LINK != 0,
                    autonomous_flag: data[3] & PREFIX_FLAG_AUTONOMOUS != 0,
                    valid_lifetime: read_u32(data, 4),
                    preferred_lifetime: read_u32(data, 8),
                    prefix: read_addr(&data[16..32]),
                })
            }
            Some(NdpOptionType::RedirectedHeader) => {
                NdpOption::RedirectedHeader(data[OPTION_UNIT..].to_vec())
            }
            Some(NdpOptionType::Mtu) => {
                if data.len() != MTU_LEN {
                    return Err(invalid("MTU"));
                }
                NdpOption::Mtu(read_u32(data, 4))
            }
            Some(NdpOptionType::RouteInformation) => {
                let prefix_length = data[2];
                let fits = match units {
                    1 => prefix_length == 0,
                    2 => prefix_length <= 64,
                    3 => prefix_length <= 128,
                    _ => false,
                };
                if !fits {
                    return Err(invalid("route information"));
                }
                NdpOption::RouteInformation(RouteInformation {
                    prefix_length,
                    preference: RouterPreference::from_bits(data[3] >> 3),
                    route_lifetime: read_u32(data, 4),
                    prefix: read_prefix(&data[8..]),
                })
            }
            Some(NdpOptionType::RecursiveDnsServer) => {
                if units < 3 || (units - 1) % 2 != 0 {
                    return Err(invalid("recursive DNS server"));
                }
                NdpOption::RecursiveDnsServer(RecursiveDnsServer {
                    lifetime: read_u32(data, 4),
                    servers: data[8..].chunks_exact(16).map(read_addr).collect(),
                })
            }
            Some(NdpOptionType::SixlowpanContext) => {
                let context_length = data[2];
                if !(units == 2 || units == 3) || context_length > 128 {
                    return Err(invalid("6LoWPAN context"));
                }
                NdpOption::SixlowpanContext(SixlowpanContext {
                    context_length,
                    compression: data[3] & CONTEXT_FLAG_COMPRESSION != 0,
                    context_id: data[3] & CONTEXT_ID_MASK,
                    valid_lifetime: u16::from_be_bytes([data[6], data[7]]),
                    prefix: read_prefix(&data[8..]),
                })
            }
            None => NdpOption::Unknown {
                kind,
                length: units,
            },
        };

        Ok(option)
    }

    /// Append the wire form of this option, padded to 8 octets
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        match self {
            NdpOption::SourceLinkLayerAddress(mac) | NdpOption::TargetLinkLayerAddress(mac) => {
                let kind = if matches!(self, NdpOption::SourceLinkLayerAddress(_)) {
                    NdpOptionType::SourceLinkLayerAddress
                } else {
                    NdpOptionType::TargetLinkLayerAddress
                };
                out.extend_from_slice(&[kind as u8, 1]);
                out.extend_from_slice(&mac.0);
            }
            NdpOption::PrefixInformation(pi) => {
                let mut flags = 0u8;
                if pi.on_link_flag {
                    flags |= PREFIX_FLAG_ON_LINK;
                }
                if pi.autonomous_flag {
                    flags |= PREFIX_FLAG_AUTONOMOUS;
                }
                out.extend_from_slice(&[
                    NdpOptionType::PrefixInformation as u8,
                    4,
                    pi.prefix_length,
                    flags,
                ]);
                out.extend_from_slice(&pi.valid_lifetime.to_be_bytes());
                out.extend_from_slice(&pi.preferred_lifetime.to_be_bytes());
                out.extend_from_slice(&[0u8; 4]);
                out.extend_from_slice(&pi.prefix.octets());
            }
            NdpOption::RedirectedHeader(data) => {
                let units = (OPTION_UNIT + data.len()).div_ceil(OPTION_UNIT);
                out.extend_from_slice(&[NdpOptionType::RedirectedHeader as u8, units as u8]);
                out.extend_from_slice(&[0u8; 6]);
                out.extend_from_slice(data);
            }
            NdpOption::Mtu(mtu) => {
                out.extend_from_slice(&[NdpOptionType::Mtu as u8, 1, 0, 0]);
                out.extend_from_slice(&mtu.to_be_bytes());
            }
            NdpOption::RouteInformation(ri) => {
                let units: u8 = match ri.prefix_length {
                    0 => 1,
                    1..=64 => 2,
                    _ => 3,
                };
                out.extend_from_slice(&[
                    NdpOptionType::RouteInformation as u8,
                    units,
                    ri.prefix_length,
                    ri.preference.to_bits() << 3,
                ]);
                out.extend_from_slice(&ri.route_lifetime.to_be_bytes());
                let prefix_bytes = (units as usize - 1) * OPTION_UNIT;
                out.extend_from_slice(&ri.prefix.octets()[..prefix_bytes]);
            }
            NdpOption::RecursiveDnsServer(rdnss) => {
                let units = 1 + 2 * rdnss.servers.len();
                out.extend_from_slice(&[
                    NdpOptionType::RecursiveDnsServer as u8,
                    units as u8,
                    0,
                    0,
                ]);
                out.extend_from_slice(&rdnss.lifetime.to_be_bytes());
                for server in &rdnss.servers {
                    out.extend_from_slice(&server.octets());
                }
            }
            NdpOption::SixlowpanContext(ctx) => {
                let units: u8 = if ctx.context_length > 64 { 3 } else { 2 };
                let mut flags = ctx.context_id & CONTEXT_ID_MASK;
                if ctx.compression {
                    flags |= CONTEXT_FLAG_COMPRESSION;
                }
                out.extend_from_slice(&[
                    NdpOptionType::SixlowpanContext as u8,
                    units,
                    ctx.context_length,
                    flags,
                    0,
                    0,
                ]);
                out.extend_from_slice(&ctx.valid_lifetime.to_be_bytes());
                let prefix_bytes = (units as usize - 1) * OPTION_UNIT;
                out.extend_from_slice(&ctx.prefix.octets()[..prefix_bytes]);
            }
            NdpOption::Unknown { kind, length } => {
                out.extend_from_slice(&[*kind, *length]);
                out.resize(start + usize::from(*length).max(1) * OPTION_UNIT, 0);
            }
        }

        // Pad to the 8-octet boundary implied by the length byte
        let written = out.len() - start;
        let padded = written.div_ceil(OPTION_UNIT).max(1) * OPTION_UNIT;
        out.resize(start + padded, 0);
    }
}

fn read_mac(data: &[u8]) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&data[2..8]);
    MacAddr(mac)
}
