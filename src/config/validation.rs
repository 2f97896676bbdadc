//! Configuration validation

use super::{parse_prefix, Config, RouterAdvConfig};
use crate::protocol::ipv6::{is_link_local, MIN_MTU};
use crate::telemetry::is_known_level;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_ndp(config, &mut result);
    validate_log(config, &mut result);
    validate_interfaces(config, &mut result);

    result
}

fn validate_ndp(config: &Config, result: &mut ValidationResult) {
    let ndp = &config.ndp;

    if ndp.tick_interval_ms == 0 {
        result.error("ndp.tick_interval_ms: must be greater than 0");
    } else if ndp.tick_interval_ms > ndp.retrans_timer_ms {
        result.warn(format!(
            "ndp.tick_interval_ms: {} ms is coarser than retrans_timer_ms ({} ms)",
            ndp.tick_interval_ms, ndp.retrans_timer_ms
        ));
    }

    for (name, size) in [
        ("neighbor_cache_size", ndp.neighbor_cache_size),
        ("destination_cache_size", ndp.destination_cache_size),
        ("prefix_list_size", ndp.prefix_list_size),
        ("router_list_size", ndp.router_list_size),
        ("address_list_size", ndp.address_list_size),
    ] {
        if size == 0 {
            result.error(format!("ndp.{}: must be at least 1", name));
        }
    }

    if ndp.neighbor_queue_len == 0 {
        result.warn("ndp.neighbor_queue_len: 0 drops every packet sent during resolution");
    }

    if ndp.retrans_timer_ms == 0 {
        result.error("ndp.retrans_timer_ms: must be greater than 0");
    }

    if ndp.reachable_time_ms == 0 {
        result.error("ndp.reachable_time_ms: must be greater than 0");
    } else if ndp.reachable_time_ms > 3_600_000 {
        // RFC 4861 §6.2.1 MAX_REACHABLE_TIME
        result.warn(format!(
            "ndp.reachable_time_ms: {} exceeds one hour",
            ndp.reachable_time_ms
        ));
    }

    if ndp.cur_hop_limit == 0 {
        result.error("ndp.cur_hop_limit: must be greater than 0");
    }

    if ndp.dup_addr_detect_transmits == 0 {
        result.warn("ndp.dup_addr_detect_transmits: 0 disables Duplicate Address Detection");
    }
}

fn validate_log(config: &Config, result: &mut ValidationResult) {
    if !is_known_level(&config.log.level) {
        result.warn(format!(
            "log.level: unknown level '{}', using info",
            config.log.level
        ));
    }
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    if config.interfaces.is_empty() {
        result.warn("interfaces: none defined");
    }

    let mut ids = HashSet::new();
    for (name, iface) in &config.interfaces {
        if !ids.insert(iface.id) {
            result.error(format!("interfaces.{}: duplicate id {}", name, iface.id));
        }

        match iface.mac_addr() {
            Ok(mac) if !mac.is_unicast() => {
                result.error(format!("interfaces.{}: mac must be a unicast address", name));
            }
            Ok(_) => {}
            Err(e) => result.error(format!("interfaces.{}: {}", name, e)),
        }

        if iface.mtu < MIN_MTU {
            result.error(format!(
                "interfaces.{}: mtu {} is below the IPv6 minimum of {}",
                name, iface.mtu, MIN_MTU
            ));
        }

        let mut link_locals = usize::from(iface.link_local);
        let mut unicast = 0;
        for addr in iface.addresses.iter().chain(iface.anycast.iter()) {
            if addr.is_multicast() || addr.is_unspecified() {
                result.error(format!(
                    "interfaces.{}: {} cannot be assigned to an interface",
                    name, addr
                ));
            } else if is_link_local(addr) {
                link_locals += 1;
            } else {
                unicast += 1;
            }
        }
        if link_locals > 1 {
            result.error(format!(
                "interfaces.{}: only one link-local address is supported",
                name
            ));
        }
        if unicast + 1 > config.ndp.address_list_size {
            result.error(format!(
                "interfaces.{}: {} addresses exceed address_list_size ({} incl. link-local)",
                name, unicast, config.ndp.address_list_size
            ));
        }

        for prefix in &iface.prefixes {
            if let Err(e) = parse_prefix(prefix) {
                result.error(format!("interfaces.{}: {}", name, e));
            }
        }
        if iface.prefixes.len() > config.ndp.prefix_list_size {
            result.error(format!(
                "interfaces.{}: {} prefixes exceed prefix_list_size ({})",
                name,
                iface.prefixes.len(),
                config.ndp.prefix_list_size
            ));
        }

        for router in &iface.routers {
            if !is_link_local(&router.address) {
                result.error(format!(
                    "interfaces.{}: router {} is not a link-local address",
                    name, router.address
                ));
            }
        }
        if iface.routers.len() > config.ndp.router_list_size {
            result.error(format!(
                "interfaces.{}: {} routers exceed router_list_size ({})",
                name,
                iface.routers.len(),
                config.ndp.router_list_size
            ));
        }

        if let Some(ra) = &iface.router_adv {
            validate_router_adv(name, ra, iface.mtu, result);
        }

        if !iface.up {
            result.warn(format!("interfaces.{}: link starts down", name));
        }
    }
}

/// RFC 4861 §6.2.1 limits on router configuration variables
fn validate_router_adv(name: &str, ra: &RouterAdvConfig, mtu: u32, result: &mut ValidationResult) {
    let at = format!("interfaces.{}.router_adv", name);

    if !(4_000..=1_800_000).contains(&ra.max_interval_ms) {
        result.error(format!(
            "{}: max_interval_ms {} is outside 4000..=1800000",
            at, ra.max_interval_ms
        ));
    }
    let min_too_large = u64::from(ra.min_interval_ms) * 4 > u64::from(ra.max_interval_ms) * 3;
    if ra.min_interval_ms < 3_000 || min_too_large {
        result.error(format!(
            "{}: min_interval_ms {} must be at least 3000 and at most 0.75 x max_interval_ms",
            at, ra.min_interval_ms
        ));
    }

    let lifetime_ms = u32::from(ra.router_lifetime) * 1000;
    if ra.router_lifetime != 0 && (lifetime_ms < ra.max_interval_ms || ra.router_lifetime > 9000)
    {
        result.error(format!(
            "{}: router_lifetime {} s must be 0 or between max_interval_ms and 9000 s",
            at, ra.router_lifetime
        ));
    }

    if let Some(adv_mtu) = ra.mtu {
        if adv_mtu < MIN_MTU || adv_mtu > mtu {
            result.error(format!(
                "{}: mtu {} must lie between {} and the interface MTU {}",
                at, adv_mtu, MIN_MTU, mtu
            ));
        }
    }

    for prefix in &ra.prefixes {
        if prefix.preferred_lifetime > prefix.valid_lifetime {
            result.error(format!(
                "{}: prefix {} preferred_lifetime exceeds valid_lifetime",
                at, prefix.prefix
            ));
        }
    }

    if !ra.dns_servers.is_empty() && ra.dns_lifetime == 0 {
        result.warn(format!("{}: dns_lifetime 0 withdraws the advertised DNS servers", at));
    }

    // Prefix syntax and the packet size check
    if let Err(e) = ra.to_settings().and_then(|settings| settings.check()) {
        result.error(format!("{}: {}", at, e));
    }
}
