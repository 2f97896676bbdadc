//! IPv6 addressing helpers used by Neighbor Discovery (RFC 4291)

use std::net::Ipv6Addr;

/// Minimum link MTU every IPv6 link must support
pub const MIN_MTU: u32 = 1280;

/// Fixed IPv6 header length
pub const HEADER_LEN: usize = 40;

/// All-nodes link-local multicast group (ff02::1)
pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// All-routers link-local multicast group (ff02::2)
pub const ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);

/// Unicast link-local scope (fe80::/10)
pub fn is_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Solicited-node multicast group for `addr` (ff02::1:ffXX:XXXX)
pub fn solicited_node(addr: &Ipv6Addr) -> Ipv6Addr {
    let o = addr.octets();
    Ipv6Addr::from([
        0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0xff, o[13], o[14], o[15],
    ])
}

/// Whether `addr` is some solicited-node multicast group
pub fn is_solicited_node(addr: &Ipv6Addr) -> bool {
    let o = addr.octets();
    o[..13] == [0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0xff]
}

/// Zero every bit past `prefix_len`
pub fn mask_prefix(addr: &Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    let len = u32::from(prefix_len.min(128));
    let bits = u128::from_be_bytes(addr.octets());
    let mask = if len == 0 { 0 } else { u128::MAX << (128 - len) };
    Ipv6Addr::from((bits & mask).to_be_bytes())
}

/// Whether the first `prefix_len` bits of `a` and `b` match
pub fn prefix_matches(a: &Ipv6Addr, b: &Ipv6Addr, prefix_len: u8) -> bool {
    mask_prefix(a, prefix_len) == mask_prefix(b, prefix_len)
}

/// Number of leading bits shared by `a` and `b`
pub fn common_prefix_len(a: &Ipv6Addr, b: &Ipv6Addr) -> u8 {
    let diff = u128::from_be_bytes(a.octets()) ^ u128::from_be_bytes(b.octets());
    diff.leading_zeros() as u8
}

/// Source and destination of the IPv6 header `packet` starts with
pub fn header_addrs(packet: &[u8]) -> Option<(Ipv6Addr, Ipv6Addr)> {
    if packet.len() < HEADER_LEN {
        return None;
    }
    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&packet[8..24]);
    dst.copy_from_slice(&packet[24..40]);
    Some((Ipv6Addr::from(src), Ipv6Addr::from(dst)))
}
