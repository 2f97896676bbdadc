//! ICMPv6 protocol - RFC 4443, NDP messages - RFC 4861 §4

use super::ndp_option::{
    encode_options, parse_options, NdpOption, PrefixInformation, RecursiveDnsServer,
    RouteInformation, RouterPreference, SixlowpanContext,
};
use super::MacAddr;
use crate::{Error, Result};
use std::net::Ipv6Addr;

/// IPv6 Next Header value for ICMPv6
const IPPROTO_ICMPV6: u8 = 58;

/// Type, code and checksum
pub const MIN_HEADER_SIZE: usize = 4;

/// NS/NA without options: header, flags/reserved, target
pub const NDP_MSG_SIZE: usize = 24;

/// Router Solicitation body: 4 reserved bytes
const RS_BODY_SIZE: usize = 4;
/// Router Advertisement body before options
const RA_BODY_SIZE: usize = 12;
/// NS/NA body before options
const NS_NA_BODY_SIZE: usize = 20;
/// Redirect body before options: reserved + target + destination
const REDIRECT_BODY_SIZE: usize = 36;

const RA_FLAG_MANAGED: u8 = 0x80;
const RA_FLAG_OTHER: u8 = 0x40;
const NA_FLAG_ROUTER: u8 = 0x80;
const NA_FLAG_SOLICITED: u8 = 0x40;
const NA_FLAG_OVERRIDE: u8 = 0x20;

/// ICMPv6 message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Icmpv6Type {
    DestinationUnreachable = 1,
    PacketTooBig = 2,
    TimeExceeded = 3,
    ParameterProblem = 4,
    EchoRequest = 128,
    EchoReply = 129,
    RouterSolicitation = 133,
    RouterAdvertisement = 134,
    NeighborSolicitation = 135,
    NeighborAdvertisement = 136,
    Redirect = 137,
}

impl Icmpv6Type {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Icmpv6Type::DestinationUnreachable),
            2 => Some(Icmpv6Type::PacketTooBig),
            3 => Some(Icmpv6Type::TimeExceeded),
            4 => Some(Icmpv6Type::ParameterProblem),
            128 => Some(Icmpv6Type::EchoRequest),
            129 => Some(Icmpv6Type::EchoReply),
            133 => Some(Icmpv6Type::RouterSolicitation),
            134 => Some(Icmpv6Type::RouterAdvertisement),
            135 => Some(Icmpv6Type::NeighborSolicitation),
            136 => Some(Icmpv6Type::NeighborAdvertisement),
            137 => Some(Icmpv6Type::Redirect),
            _ => None,
        }
    }

    /// Types 133-137 handled by Neighbor Discovery
    pub fn is_ndp(self) -> bool {
        matches!(
            self,
            Icmpv6Type::RouterSolicitation
                | Icmpv6Type::RouterAdvertisement
                | Icmpv6Type::NeighborSolicitation
                | Icmpv6Type::NeighborAdvertisement
                | Icmpv6Type::Redirect
        )
    }
}

/// Destination Unreachable code 3
pub const DEST_UNREACH_ADDRESS: u8 = 3;

/// Parsed ICMPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Icmpv6Packet<'a> {
    buffer: &'a [u8],
}

impl<'a> Icmpv6Packet<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("ICMPv6 packet too short".into()));
        }

        Ok(Self { buffer })
    }

    /// Message type
    pub fn msg_type(&self) -> u8 {
        self.buffer[0]
    }

    /// Message code
    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    /// Checksum
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Message body (after header)
    pub fn body(&self) -> &[u8] {
        &self.buffer[MIN_HEADER_SIZE..]
    }

    /// Raw packet bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer
    }
}

fn read_addr(buffer: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buffer[..16]);
    Ipv6Addr::from(octets)
}

fn read_u32(buffer: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buffer[at], buffer[at + 1], buffer[at + 2], buffer[at + 3]])
}

fn header(msg_type: Icmpv6Type) -> Vec<u8> {
    vec![msg_type as u8, 0, 0, 0]
}

/// Router Solicitation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSolicitation {
    pub source_link_addr: Option<MacAddr>,
}

impl RouterSolicitation {
    pub fn new(source_link_addr: Option<MacAddr>) -> Self {
        Self { source_link_addr }
    }

    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < RS_BODY_SIZE {
            return Err(Error::Parse("Router Solicitation too short".into()));
        }

        let mut source_link_addr = None;
        for option in parse_options(&buffer[RS_BODY_SIZE..])? {
            if let NdpOption::SourceLinkLayerAddress(mac) = option {
                source_link_addr = Some(mac);
            }
        }

        Ok(Self { source_link_addr })
    }

    /// Build RS message bytes (ICMPv6 payload, without IPv6 header)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::RouterSolicitation);
        buf.extend_from_slice(&[0u8; RS_BODY_SIZE]);
        if let Some(mac) = self.source_link_addr {
            NdpOption::SourceLinkLayerAddress(mac).encode(&mut buf);
        }
        buf
    }
}

/// Router Advertisement message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAdvertisement {
    pub cur_hop_limit: u8,
    pub managed_flag: bool,
    pub other_flag: bool,
    pub preference: RouterPreference,
    /// Seconds, 0 = not a default router
    pub router_lifetime: u16,
    /// Milliseconds, 0 = unspecified
    pub reachable_time: u32,
    /// Milliseconds, 0 = unspecified
    pub retrans_timer: u32,
    pub source_link_addr: Option<MacAddr>,
    pub mtu: Option<u32>,
    pub prefixes: Vec<PrefixInformation>,
    pub routes: Vec<RouteInformation>,
    pub rdnss: Vec<RecursiveDnsServer>,
    pub contexts: Vec<SixlowpanContext>,
}

impl RouterAdvertisement {
    pub fn new(
        cur_hop_limit: u8,
        managed_flag: bool,
        other_flag: bool,
        router_lifetime: u16,
        reachable_time: u32,
        retrans_timer: u32,
    ) -> Self {
        Self {
            cur_hop_limit,
            managed_flag,
            other_flag,
            preference: RouterPreference::Medium,
            router_lifetime,
            reachable_time,
            retrans_timer,
            source_link_addr: None,
            mtu: None,
            prefixes: Vec::new(),
            routes: Vec::new(),
            rdnss: Vec::new(),
            contexts: Vec::new(),
        }
    }

    pub fn with_preference(mut self, preference: RouterPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_source_link_addr(mut self, mac: MacAddr) -> Self {
        self.source_link_addr = Some(mac);
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn with_prefix(mut self, prefix: PrefixInformation) -> Self {
        self.prefixes.push(prefix);
        self
    }

    pub fn with_route(mut self, route: RouteInformation) -> Self {
        self.routes.push(route);
        self
    }

    pub fn with_rdnss(mut self, servers: Vec<Ipv6Addr>, lifetime: u32) -> Self {
        self.rdnss.push(RecursiveDnsServer { lifetime, servers });
        self
    }

    pub fn with_context(mut self, context: SixlowpanContext) -> Self {
        self.contexts.push(context);
        self
    }

    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < RA_BODY_SIZE {
            return Err(Error::Parse("Router Advertisement too short".into()));
        }

        let flags = buffer[1];
        let mut ra = Self::new(
            buffer[0],
            flags & RA_FLAG_MANAGED != 0,
            flags & RA_FLAG_OTHER != 0,
            u16::from_be_bytes([buffer[2], buffer[3]]),
            read_u32(buffer, 4),
            read_u32(buffer, 8),
        )
        .with_preference(RouterPreference::from_bits(flags >> 3));

        for option in parse_options(&buffer[RA_BODY_SIZE..])? {
            match option {
                NdpOption::SourceLinkLayerAddress(mac) => ra.source_link_addr = Some(mac),
                NdpOption::Mtu(mtu) => ra.mtu = Some(mtu),
                NdpOption::PrefixInformation(pi) => ra.prefixes.push(pi),
                NdpOption::RouteInformation(ri) => ra.routes.push(ri),
                NdpOption::RecursiveDnsServer(rdnss) => ra.rdnss.push(rdnss),
                NdpOption::SixlowpanContext(ctx) => ra.contexts.push(ctx),
                _ => {}
            }
        }

        Ok(ra)
    }

    /// Build RA message bytes (ICMPv6 payload, without IPv6 header)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::RouterAdvertisement);

        let mut flags = self.preference.to_bits() << 3;
        if self.managed_flag {
            flags |= RA_FLAG_MANAGED;
        }
        if self.other_flag {
            flags |= RA_FLAG_OTHER;
        }
        buf.push(self.cur_hop_limit);
        buf.push(flags);
        buf.extend_from_slice(&self.router_lifetime.to_be_bytes());
        buf.extend_from_slice(&self.reachable_time.to_be_bytes());
        buf.extend_from_slice(&self.retrans_timer.to_be_bytes());

        let mut options = Vec::new();
        if let Some(mac) = self.source_link_addr {
            options.push(NdpOption::SourceLinkLayerAddress(mac));
        }
        if let Some(mtu) = self.mtu {
            options.push(NdpOption::Mtu(mtu));
        }
        options.extend(self.prefixes.iter().cloned().map(NdpOption::PrefixInformation));
        options.extend(self.routes.iter().cloned().map(NdpOption::RouteInformation));
        options.extend(self.rdnss.iter().cloned().map(NdpOption::RecursiveDnsServer));
        options.extend(self.contexts.iter().cloned().map(NdpOption::SixlowpanContext));
        encode_options(&options, &mut buf);

        buf
    }
}

/// Neighbor Solicitation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSolicitation {
    pub target_addr: Ipv6Addr,
    pub source_link_addr: Option<MacAddr>,
}

impl NeighborSolicitation {
    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        // Minimum: 4 (reserved) + 16 (target) = 20 bytes
        if buffer.len() < NS_NA_BODY_SIZE {
            return Err(Error::Parse("Neighbor Solicitation too short".into()));
        }

        let target_addr = read_addr(&buffer[4..20]);

        let mut source_link_addr = None;
        for option in parse_options(&buffer[NS_NA_BODY_SIZE..])? {
            if let NdpOption::SourceLinkLayerAddress(mac) = option {
                source_link_addr = Some(mac);
            }
        }

        Ok(Self {
            target_addr,
            source_link_addr,
        })
    }

    /// Build NS message bytes (ICMPv6 payload, without IPv6 header)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::NeighborSolicitation);
        // Reserved
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&self.target_addr.octets());

        if let Some(mac) = self.source_link_addr {
            NdpOption::SourceLinkLayerAddress(mac).encode(&mut buf);
        }

        buf
    }

    /// Create a new NS for the given target
    pub fn new(target_addr: Ipv6Addr, source_link_addr: Option<MacAddr>) -> Self {
        Self {
            target_addr,
            source_link_addr,
        }
    }
}

/// Neighbor Advertisement message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborAdvertisement {
    pub router_flag: bool,
    pub solicited_flag: bool,
    pub override_flag: bool,
    pub target_addr: Ipv6Addr,
    pub target_link_addr: Option<MacAddr>,
}

impl NeighborAdvertisement {
    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        // Minimum: 4 (flags/reserved) + 16 (target) = 20 bytes
        if buffer.len() < NS_NA_BODY_SIZE {
            return Err(Error::Parse("Neighbor Advertisement too short".into()));
        }

        let flags = buffer[0];
        let target_addr = read_addr(&buffer[4..20]);

        let mut target_link_addr = None;
        for option in parse_options(&buffer[NS_NA_BODY_SIZE..])? {
            if let NdpOption::TargetLinkLayerAddress(mac) = option {
                target_link_addr = Some(mac);
            }
        }

        Ok(Self {
            router_flag: flags & NA_FLAG_ROUTER != 0,
            solicited_flag: flags & NA_FLAG_SOLICITED != 0,
            override_flag: flags & NA_FLAG_OVERRIDE != 0,
            target_addr,
            target_link_addr,
        })
    }

    /// Build NA message bytes (ICMPv6 payload, without IPv6 header)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::NeighborAdvertisement);

        let mut flags: u8 = 0;
        if self.router_flag {
            flags |= NA_FLAG_ROUTER;
        }
        if self.solicited_flag {
            flags |= NA_FLAG_SOLICITED;
        }
        if self.override_flag {
            flags |= NA_FLAG_OVERRIDE;
        }
        buf.extend_from_slice(&[flags, 0, 0, 0]);
        buf.extend_from_slice(&self.target_addr.octets());

        if let Some(mac) = self.target_link_addr {
            NdpOption::TargetLinkLayerAddress(mac).encode(&mut buf);
        }

        buf
    }

    pub fn new(
        target_addr: Ipv6Addr,
        target_link_addr: Option<MacAddr>,
        router_flag: bool,
        solicited_flag: bool,
        override_flag: bool,
    ) -> Self {
        Self {
            router_flag,
            solicited_flag,
            override_flag,
            target_addr,
            target_link_addr,
        }
    }

    /// Create a solicited NA (reply to NS for our address)
    pub fn solicited_reply(target_addr: Ipv6Addr, target_link_addr: MacAddr) -> Self {
        Self::new(target_addr, Some(target_link_addr), false, true, true)
    }
}

/// Redirect message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Better first hop
    pub target_addr: Ipv6Addr,
    /// Destination being redirected
    pub dest_addr: Ipv6Addr,
    pub target_link_addr: Option<MacAddr>,
    pub redirected_header: Option<Vec<u8>>,
}

impl Redirect {
    pub fn new(
        target_addr: Ipv6Addr,
        dest_addr: Ipv6Addr,
        target_link_addr: Option<MacAddr>,
    ) -> Self {
        Self {
            target_addr,
            dest_addr,
            target_link_addr,
            redirected_header: None,
        }
    }

    /// Whether the target is the destination itself (destination is on-link)
    pub fn is_on_link(&self) -> bool {
        self.target_addr == self.dest_addr
    }

    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < REDIRECT_BODY_SIZE {
            return Err(Error::Parse("Redirect too short".into()));
        }

        let mut redirect = Self::new(read_addr(&buffer[4..20]), read_addr(&buffer[20..36]), None);

        for option in parse_options(&buffer[REDIRECT_BODY_SIZE..])? {
            match option {
                NdpOption::TargetLinkLayerAddress(mac) => redirect.target_link_addr = Some(mac),
                NdpOption::RedirectedHeader(data) => redirect.redirected_header = Some(data),
                _ => {}
            }
        }

        Ok(redirect)
    }

    /// Build Redirect message bytes (ICMPv6 payload, without IPv6 header)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::Redirect);
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&self.target_addr.octets());
        buf.extend_from_slice(&self.dest_addr.octets());

        if let Some(mac) = self.target_link_addr {
            NdpOption::TargetLinkLayerAddress(mac).encode(&mut buf);
        }
        if let Some(data) = &self.redirected_header {
            NdpOption::RedirectedHeader(data.clone()).encode(&mut buf);
        }

        buf
    }
}

/// Any Neighbor Discovery message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdpMessage {
    RouterSolicitation(RouterSolicitation),
    RouterAdvertisement(RouterAdvertisement),
    NeighborSolicitation(NeighborSolicitation),
    NeighborAdvertisement(NeighborAdvertisement),
    Redirect(Redirect),
}

impl NdpMessage {
    /// Decode an NDP message from a full ICMPv6 packet
    ///
    /// Rejects non-zero codes and malformed option blocks.
    pub fn parse(packet: &Icmpv6Packet<'_>) -> Result<Self> {
        if packet.code() != 0 {
            return Err(Error::InvalidPacket(format!(
                "NDP message with code {}",
                packet.code()
            )));
        }

        let body = packet.body();
        let message = match Icmpv6Type::from_u8(packet.msg_type()) {
            Some(Icmpv6Type::RouterSolicitation) => {
                NdpMessage::RouterSolicitation(RouterSolicitation::parse(body)?)
            }
            Some(Icmpv6Type::RouterAdvertisement) => {
                NdpMessage::RouterAdvertisement(RouterAdvertisement::parse(body)?)
            }
            Some(Icmpv6Type::NeighborSolicitation) => {
                NdpMessage::NeighborSolicitation(NeighborSolicitation::parse(body)?)
            }
            Some(Icmpv6Type::NeighborAdvertisement) => {
                NdpMessage::NeighborAdvertisement(NeighborAdvertisement::parse(body)?)
            }
            Some(Icmpv6Type::Redirect) => NdpMessage::Redirect(Redirect::parse(body)?),
            _ => {
                return Err(Error::InvalidPacket(format!(
                    "ICMPv6 type {} is not an NDP message",
                    packet.msg_type()
                )))
            }
        };

        Ok(message)
    }

    pub fn msg_type(&self) -> Icmpv6Type {
        match self {
            NdpMessage::RouterSolicitation(_) => Icmpv6Type::RouterSolicitation,
            NdpMessage::RouterAdvertisement(_) => Icmpv6Type::RouterAdvertisement,
            NdpMessage::NeighborSolicitation(_) => Icmpv6Type::NeighborSolicitation,
            NdpMessage::NeighborAdvertisement(_) => Icmpv6Type::NeighborAdvertisement,
            NdpMessage::Redirect(_) => Icmpv6Type::Redirect,
        }
    }

    /// ICMPv6 payload with a zero checksum
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            NdpMessage::RouterSolicitation(m) => m.to_bytes(),
            NdpMessage::RouterAdvertisement(m) => m.to_bytes(),
            NdpMessage::NeighborSolicitation(m) => m.to_bytes(),
            NdpMessage::NeighborAdvertisement(m) => m.to_bytes(),
            NdpMessage::Redirect(m) => m.to_bytes(),
        }
    }
}

/// Add big-endian 16-bit words to `sum`; an odd trailing byte is padded
fn add_words(sum: u32, data: &[u8]) -> u32 {
    data.chunks(2).fold(sum, |acc, pair| {
        let word = match *pair {
            [hi, lo] => u16::from_be_bytes([hi, lo]),
            [hi] => u16::from_be_bytes([hi, 0]),
            _ => 0,
        };
        acc.wrapping_add(u32::from(word))
    })
}

/// IPv6 pseudo-header (RFC 8200 §8.1) plus the ICMPv6 message
fn ones_complement_sum(src_addr: &Ipv6Addr, dst_addr: &Ipv6Addr, message: &[u8]) -> u16 {
    let length = message.len() as u32;
    let mut sum = add_words(0, &src_addr.octets());
    sum = add_words(sum, &dst_addr.octets());
    sum = add_words(sum, &length.to_be_bytes());
    sum = add_words(sum, &[0, 0, 0, IPPROTO_ICMPV6]);
    sum = add_words(sum, message);

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// ICMPv6 checksum over `message`, ignoring its checksum field
pub fn calculate_checksum(src_addr: &Ipv6Addr, dst_addr: &Ipv6Addr, message: &[u8]) -> u16 {
    if message.len() < MIN_HEADER_SIZE {
        return !ones_complement_sum(src_addr, dst_addr, message);
    }
    let mut zeroed = message.to_vec();
    zeroed[2..4].fill(0);
    !ones_complement_sum(src_addr, dst_addr, &zeroed)
}

/// Write the checksum into bytes 2..4 of `buffer`
pub fn set_checksum(buffer: &mut [u8], src_addr: &Ipv6Addr, dst_addr: &Ipv6Addr) {
    if buffer.len() < MIN_HEADER_SIZE {
        return;
    }
    let checksum = calculate_checksum(src_addr, dst_addr, buffer);
    buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
}

pub fn validate_checksum(src_addr: &Ipv6Addr, dst_addr: &Ipv6Addr, message: &[u8]) -> bool {
    ones_complement_sum(src_addr, dst_addr, message) == 0xffff
}
