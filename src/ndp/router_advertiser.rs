//! Router Advertisement sending - RFC 4861 §6.2
//!
//! An interface switched to router mode owns a [`RouterAdvertiser`] that
//! schedules unsolicited advertisements and pulls the next one forward when
//! a Router Solicitation arrives.

use super::Millis;
use crate::protocol::icmpv6::RouterAdvertisement;
use crate::protocol::ipv6::{HEADER_LEN, MIN_MTU};
use crate::protocol::ndp_option::{PrefixInformation, RouteInformation, RouterPreference};
use crate::protocol::MacAddr;
use crate::{Error, Result};
use rand::Rng;
use std::net::Ipv6Addr;
use tracing::trace;

/// Upper bound for MaxRtrAdvInterval (ms)
pub const MAX_RTR_ADVERT_INTERVAL: u32 = 600_000;
/// Spacing cap for the first few advertisements (ms)
pub const MAX_INITIAL_RTR_ADVERT_INTERVAL: u32 = 16_000;
pub const MAX_INITIAL_RTR_ADVERTISEMENTS: u32 = 3;
/// Multicast RAs are never closer together than this (ms)
pub const MIN_DELAY_BETWEEN_RAS: u32 = 3_000;
/// Upper bound of the random delay before answering an RS (ms)
pub const MAX_RA_DELAY_TIME: u32 = 500;

/// Prefix to advertise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedPrefix {
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    /// On-link flag (L)
    pub on_link: bool,
    /// Autonomous flag (A)
    pub autonomous: bool,
    /// Seconds, 0xffffffff = infinity
    pub valid_lifetime: u32,
    /// Seconds
    pub preferred_lifetime: u32,
}

impl AdvertisedPrefix {
    /// On-link, autonomous, valid for 30 days and preferred for 7
    pub fn new(prefix: Ipv6Addr, prefix_len: u8) -> Self {
        Self {
            prefix,
            prefix_len,
            on_link: true,
            autonomous: true,
            valid_lifetime: 2_592_000,
            preferred_lifetime: 604_800,
        }
    }

    pub fn with_flags(mut self, on_link: bool, autonomous: bool) -> Self {
        self.on_link = on_link;
        self.autonomous = autonomous;
        self
    }

    pub fn with_lifetimes(mut self, valid: u32, preferred: u32) -> Self {
        self.valid_lifetime = valid;
        self.preferred_lifetime = preferred;
        self
    }

    fn to_prefix_info(&self) -> PrefixInformation {
        PrefixInformation::new(
            self.prefix,
            self.prefix_len,
            self.on_link,
            self.autonomous,
            self.valid_lifetime,
            self.preferred_lifetime,
        )
    }
}

/// What a router interface advertises and how often
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAdvSettings {
    /// MinRtrAdvInterval (ms)
    pub min_interval: u32,
    /// MaxRtrAdvInterval (ms)
    pub max_interval: u32,
    /// Advertised Cur Hop Limit (0 = unspecified)
    pub cur_hop_limit: u8,
    /// M flag
    pub managed: bool,
    /// O flag
    pub other: bool,
    pub preference: RouterPreference,
    /// Seconds; 0 means not a default router
    pub router_lifetime: u16,
    /// ms, 0 = unspecified
    pub reachable_time: u32,
    /// ms, 0 = unspecified
    pub retrans_timer: u32,
    pub mtu: Option<u32>,
    pub prefixes: Vec<AdvertisedPrefix>,
    pub routes: Vec<RouteInformation>,
    pub dns_servers: Vec<Ipv6Addr>,
    /// Seconds
    pub dns_lifetime: u32,
}

impl Default for RouterAdvSettings {
    fn default() -> Self {
        Self {
            min_interval: MAX_RTR_ADVERT_INTERVAL / 3,
            max_interval: MAX_RTR_ADVERT_INTERVAL,
            cur_hop_limit: 64,
            managed: false,
            other: false,
            preference: RouterPreference::Medium,
            router_lifetime: 1800,
            reachable_time: 0,
            retrans_timer: 0,
            mtu: None,
            prefixes: Vec::new(),
            routes: Vec::new(),
            dns_servers: Vec::new(),
            dns_lifetime: 0,
        }
    }
}

impl RouterAdvSettings {
    pub fn with_prefix(mut self, prefix: AdvertisedPrefix) -> Self {
        self.prefixes.push(prefix);
        self
    }

    pub fn with_route(mut self, route: RouteInformation) -> Self {
        self.routes.push(route);
        self
    }

    /// Advertisement spacing bounds (ms)
    pub fn with_intervals(mut self, min: u32, max: u32) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }

    pub fn with_router_lifetime(mut self, seconds: u16) -> Self {
        self.router_lifetime = seconds;
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn with_dns_servers(mut self, servers: Vec<Ipv6Addr>, lifetime: u32) -> Self {
        self.dns_servers = servers;
        self.dns_lifetime = lifetime;
        self
    }

    /// Reject intervals that cannot be scheduled and option sets that do
    /// not fit a minimum-MTU packet
    pub fn check(&self) -> Result<()> {
        if self.max_interval == 0 || self.min_interval > self.max_interval {
            return Err(Error::InvalidParameter(format!(
                "advertisement interval {}..{} ms is empty",
                self.min_interval, self.max_interval
            )));
        }
        let ra = self.build(MacAddr::default(), self.router_lifetime);
        let len = HEADER_LEN + ra.to_bytes().len();
        if len > MIN_MTU as usize {
            return Err(Error::InvalidParameter(format!(
                "Router Advertisement of {} bytes exceeds the minimum MTU",
                len
            )));
        }
        Ok(())
    }

    /// Advertisement announcing `router_lifetime`
    ///
    /// A zero lifetime is always sent with Medium preference (RFC 4191 §2.2).
    pub fn build(&self, mac: MacAddr, router_lifetime: u16) -> RouterAdvertisement {
        let preference = if router_lifetime == 0 {
            RouterPreference::Medium
        } else {
            self.preference
        };

        let mut ra = RouterAdvertisement::new(
            self.cur_hop_limit,
            self.managed,
            self.other,
            router_lifetime,
            self.reachable_time,
            self.retrans_timer,
        )
        .with_preference(preference)
        .with_source_link_addr(mac);

        if let Some(mtu) = self.mtu {
            ra = ra.with_mtu(mtu);
        }
        for prefix in &self.prefixes {
            ra = ra.with_prefix(prefix.to_prefix_info());
        }
        for route in &self.routes {
            ra = ra.with_route(route.clone());
        }
        if !self.dns_servers.is_empty() {
            ra = ra.with_rdnss(self.dns_servers.clone(), self.dns_lifetime);
        }
        ra
    }
}

/// Advertisement schedule of one router interface
#[derive(Debug)]
pub struct RouterAdvertiser {
    settings: RouterAdvSettings,
    /// When the last advertisement went out
    timestamp: Millis,
    /// Delay after `timestamp` until the next one
    timeout: u64,
    sent: u32,
}

impl RouterAdvertiser {
    /// First advertisement is due immediately
    pub fn new(settings: RouterAdvSettings, now: Millis) -> Self {
        Self {
            settings,
            timestamp: now,
            timeout: 0,
            sent: 0,
        }
    }

    pub fn settings(&self) -> &RouterAdvSettings {
        &self.settings
    }

    /// Unsolicited advertisements since the last restart
    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Clock value at which the next advertisement goes out
    pub fn next_due(&self) -> Millis {
        self.timestamp + self.timeout
    }

    /// Begin a fresh initial burst (link came up)
    pub fn restart(&mut self, now: Millis) {
        self.timestamp = now;
        self.timeout = 0;
        self.sent = 0;
    }

    /// True when an advertisement is due at `now`; schedules the next one
    pub fn poll<R: Rng>(&mut self, now: Millis, rng: &mut R) -> bool {
        if now < self.next_due() {
            return false;
        }

        let mut interval = rng.gen_range(self.settings.min_interval..=self.settings.max_interval);
        if self.sent < MAX_INITIAL_RTR_ADVERTISEMENTS {
            interval = interval.min(MAX_INITIAL_RTR_ADVERT_INTERVAL);
        }
        self.timestamp = now;
        self.timeout = u64::from(interval);
        self.sent += 1;
        true
    }

    /// A Router Solicitation arrived at `now`
    ///
    /// The next multicast advertisement is moved to a random point within
    /// MAX_RA_DELAY_TIME, but never earlier than MIN_DELAY_BETWEEN_RAS after
    /// the previous one and never later than already planned.
    pub fn solicited<R: Rng>(&mut self, now: Millis, rng: &mut R) {
        let delay = u64::from(rng.gen_range(0..=MAX_RA_DELAY_TIME));
        if now + delay > self.next_due() {
            return;
        }

        let min_gap = u64::from(MIN_DELAY_BETWEEN_RAS);
        let timeout = if now < self.timestamp + min_gap {
            min_gap + delay
        } else {
            now + delay - self.timestamp
        };
        self.timeout = self.timeout.min(timeout);
        trace!(due = self.next_due(), "Router Advertisement rescheduled");
    }
}
