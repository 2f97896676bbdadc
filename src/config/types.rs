//! Configuration types

use crate::ndp::router_advertiser::MAX_RTR_ADVERT_INTERVAL;
use crate::ndp::{
    AdvertisedPrefix, InterfaceId, RouterAdvSettings, DEFAULT_HOP_LIMIT, MAX_RTR_SOLICITATIONS,
    NEIGHBOR_QUEUE_LEN, NUM_ADDRESSES, NUM_DESTINATIONS, NUM_NEIGHBORS, NUM_PREFIXES,
    NUM_ROUTERS, REACHABLE_TIME, RETRANS_TIMER, TICK_INTERVAL,
};
use crate::protocol::ndp_option::{RouteInformation, RouterPreference};
use crate::protocol::MacAddr;
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv6Addr;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ndp: NdpSettings,
    #[serde(default, skip_serializing)]
    pub log: LogConfig,
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceConfig>,
}

/// `[ndp]` protocol constants and table sizes shared by every interface
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NdpSettings {
    /// Period of the timer tick (ms)
    pub tick_interval_ms: u32,
    pub neighbor_cache_size: usize,
    pub destination_cache_size: usize,
    pub prefix_list_size: usize,
    pub router_list_size: usize,
    /// Including the link-local slot
    pub address_list_size: usize,
    /// Packets held per neighbor while resolving
    pub neighbor_queue_len: usize,
    pub cur_hop_limit: u8,
    /// Base ReachableTime (ms)
    pub reachable_time_ms: u32,
    /// RetransTimer (ms)
    pub retrans_timer_ms: u32,
    pub dup_addr_detect_transmits: u8,
    /// Send Router Solicitations on link-up
    pub router_solicitations: bool,
    pub max_router_solicitations: u8,
    /// Fixed seed for protocol randomization
    pub rng_seed: Option<u64>,
}

impl Default for NdpSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL,
            neighbor_cache_size: NUM_NEIGHBORS,
            destination_cache_size: NUM_DESTINATIONS,
            prefix_list_size: NUM_PREFIXES,
            router_list_size: NUM_ROUTERS,
            address_list_size: NUM_ADDRESSES,
            neighbor_queue_len: NEIGHBOR_QUEUE_LEN,
            cur_hop_limit: DEFAULT_HOP_LIMIT,
            reachable_time_ms: REACHABLE_TIME,
            retrans_timer_ms: RETRANS_TIMER,
            dup_addr_detect_transmits: 1,
            router_solicitations: true,
            max_router_solicitations: MAX_RTR_SOLICITATIONS,
            rng_seed: None,
        }
    }
}

fn default_mtu() -> u32 {
    1500
}

fn default_true() -> bool {
    true
}

/// `[interfaces.<name>]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InterfaceConfig {
    pub id: InterfaceId,
    pub mac: String,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    /// Assign the EUI-64 link-local address
    #[serde(default = "default_true")]
    pub link_local: bool,
    /// Bring the link up when the stack is built
    #[serde(default = "default_true")]
    pub up: bool,
    /// Permanent unicast addresses
    #[serde(default)]
    pub addresses: Vec<Ipv6Addr>,
    /// Permanent anycast addresses
    #[serde(default)]
    pub anycast: Vec<Ipv6Addr>,
    /// Permanent on-link prefixes, "2001:db8::/64"
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Permanent default routers (link-local)
    #[serde(default)]
    pub routers: Vec<StaticRouter>,
    /// Send Router Advertisements on this interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_adv: Option<RouterAdvConfig>,
}

impl InterfaceConfig {
    pub fn mac_addr(&self) -> Result<MacAddr> {
        self.mac
            .parse()
            .map_err(|e| Error::Config(format!("invalid MAC address '{}': {}", self.mac, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StaticRouter {
    pub address: Ipv6Addr,
    #[serde(default)]
    pub preference: Preference,
}

/// `[interfaces.<name>.router_adv]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterAdvConfig {
    pub min_interval_ms: u32,
    pub max_interval_ms: u32,
    pub cur_hop_limit: u8,
    /// M flag
    pub managed: bool,
    /// O flag
    pub other: bool,
    pub preference: Preference,
    /// Seconds; 0 advertises a router that is not a default router
    pub router_lifetime: u16,
    pub reachable_time_ms: u32,
    pub retrans_timer_ms: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    pub prefixes: Vec<AdvertisedPrefixConfig>,
    pub routes: Vec<AdvertisedRouteConfig>,
    pub dns_servers: Vec<Ipv6Addr>,
    /// Seconds
    pub dns_lifetime: u32,
}

impl Default for RouterAdvConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: MAX_RTR_ADVERT_INTERVAL / 3,
            max_interval_ms: MAX_RTR_ADVERT_INTERVAL,
            cur_hop_limit: DEFAULT_HOP_LIMIT,
            managed: false,
            other: false,
            preference: Preference::Medium,
            router_lifetime: 1800,
            reachable_time_ms: 0,
            retrans_timer_ms: 0,
            mtu: None,
            prefixes: Vec::new(),
            routes: Vec::new(),
            dns_servers: Vec::new(),
            dns_lifetime: 0,
        }
    }
}

impl RouterAdvConfig {
    /// Engine settings with every prefix parsed
    pub fn to_settings(&self) -> Result<RouterAdvSettings> {
        let mut settings = RouterAdvSettings {
            min_interval: self.min_interval_ms,
            max_interval: self.max_interval_ms,
            cur_hop_limit: self.cur_hop_limit,
            managed: self.managed,
            other: self.other,
            preference: self.preference.into(),
            router_lifetime: self.router_lifetime,
            reachable_time: self.reachable_time_ms,
            retrans_timer: self.retrans_timer_ms,
            mtu: self.mtu,
            ..Default::default()
        };

        for p in &self.prefixes {
            let (prefix, len) = parse_prefix(&p.prefix)?;
            settings = settings.with_prefix(
                AdvertisedPrefix::new(prefix, len)
                    .with_flags(p.on_link, p.autonomous)
                    .with_lifetimes(p.valid_lifetime, p.preferred_lifetime),
            );
        }
        for r in &self.routes {
            let (prefix, prefix_length) = parse_prefix(&r.prefix)?;
            settings = settings.with_route(RouteInformation {
                prefix,
                prefix_length,
                preference: r.preference.into(),
                route_lifetime: r.lifetime,
            });
        }
        Ok(settings.with_dns_servers(self.dns_servers.clone(), self.dns_lifetime))
    }
}

/// Prefix Information option contents
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdvertisedPrefixConfig {
    /// "2001:db8::/64"
    pub prefix: String,
    #[serde(default = "default_true")]
    pub on_link: bool,
    #[serde(default = "default_true")]
    pub autonomous: bool,
    #[serde(default = "default_valid_lifetime")]
    pub valid_lifetime: u32,
    #[serde(default = "default_preferred_lifetime")]
    pub preferred_lifetime: u32,
}

fn default_valid_lifetime() -> u32 {
    2_592_000
}

fn default_preferred_lifetime() -> u32 {
    604_800
}

/// Route Information option contents (RFC 4191)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdvertisedRouteConfig {
    pub prefix: String,
    #[serde(default)]
    pub preference: Preference,
    /// Seconds
    pub lifetime: u32,
}

/// Serializable router preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Low,
    #[default]
    Medium,
    High,
}

impl From<Preference> for RouterPreference {
    fn from(p: Preference) -> Self {
        match p {
            Preference::Low => RouterPreference::Low,
            Preference::Medium => RouterPreference::Medium,
            Preference::High => RouterPreference::High,
        }
    }
}

/// Parse "addr/len" prefix notation
pub fn parse_prefix(s: &str) -> Result<(Ipv6Addr, u8)> {
    let (addr, len) = s
        .split_once('/')
        .ok_or_else(|| Error::Config(format!("prefix '{}' is missing a length", s)))?;
    let addr: Ipv6Addr = addr
        .parse()
        .map_err(|_| Error::Config(format!("invalid prefix address in '{}'", s)))?;
    let len: u8 = len
        .parse()
        .map_err(|_| Error::Config(format!("invalid prefix length in '{}'", s)))?;
    if len > 128 {
        return Err(Error::Config(format!("prefix length {} exceeds 128", len)));
    }
    Ok((addr, len))
}
