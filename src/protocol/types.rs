//! Link-layer address type

use crate::{Error, Result};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// 48-bit link-layer address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Group bit set
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast() && self.0 != [0; 6]
    }

    /// Ethernet group address for an IPv6 multicast destination (RFC 2464 §7)
    pub fn ipv6_multicast(addr: &Ipv6Addr) -> Self {
        let o = addr.octets();
        MacAddr([0x33, 0x33, o[12], o[13], o[14], o[15]])
    }

    /// Modified EUI-64 interface identifier (RFC 4291 Appendix A)
    pub fn eui64(&self) -> [u8; 8] {
        let m = &self.0;
        [m[0] ^ 0x02, m[1], m[2], 0xff, 0xfe, m[3], m[4], m[5]]
    }

    /// fe80::/64 address derived from this MAC
    pub fn link_local(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets[0] = 0xfe;
        octets[1] = 0x80;
        octets[8..].copy_from_slice(&self.eui64());
        Ipv6Addr::from(octets)
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    /// "02:00:00:00:00:01" or "02-00-00-00-00-01"
    fn from_str(s: &str) -> Result<Self> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let mut octets = [0u8; 6];
        let mut count = 0;

        for part in s.split(sep) {
            if count == octets.len() || part.len() != 2 {
                return Err(Error::Parse(format!("malformed MAC address '{}'", s)));
            }
            octets[count] = u8::from_str_radix(part, 16)
                .map_err(|_| Error::Parse(format!("invalid hex digit in MAC address '{}'", s)))?;
            count += 1;
        }

        if count != octets.len() {
            return Err(Error::Parse(format!("MAC address '{}' is too short", s)));
        }
        Ok(MacAddr(octets))
    }
}
