//! Router Discovery - RFC 4861 §6.3
//!
//! Router Solicitation scheduling and the host-side processing of accepted
//! Router Advertisements.

use super::interface::InterfaceNdpContext;
use super::{lifetime_ms, NdpAction, NdpEvent, RouterEntry, PrefixEntry, RTR_SOLICITATION_INTERVAL};
use crate::protocol::icmpv6::RouterAdvertisement;
use crate::protocol::ipv6::{is_link_local, MIN_MTU};
use std::net::Ipv6Addr;
use tracing::{debug, trace};

/// Router Solicitation progress after link-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolicitState {
    /// Link down or never started
    Idle,
    /// Waiting out the random initial delay
    Delaying,
    /// Retransmitting every RTR_SOLICITATION_INTERVAL
    Soliciting,
    /// An RA arrived or every solicitation went unanswered
    Done,
}

#[derive(Debug)]
pub struct RouterSolicitor {
    state: SolicitState,
    /// Remaining ms until the next step
    timeout: u32,
    sent: u8,
    max: u8,
}

impl RouterSolicitor {
    pub fn new(max_solicitations: u8) -> Self {
        Self {
            state: SolicitState::Idle,
            timeout: 0,
            sent: 0,
            max: max_solicitations,
        }
    }

    pub fn state(&self) -> SolicitState {
        self.state
    }

    /// Solicitations sent in the current run
    pub fn sent(&self) -> u8 {
        self.sent
    }

    /// Schedule the first solicitation after `delay` ms
    pub fn start(&mut self, delay: u32) {
        self.sent = 0;
        if self.max == 0 {
            self.state = SolicitState::Done;
            return;
        }
        self.state = SolicitState::Delaying;
        self.timeout = delay;
    }

    /// A default router answered; no further solicitations
    ///
    /// Ignored until at least one solicitation went out, so an RA that
    /// arrives during the initial delay still gets one RS sent.
    pub fn stop(&mut self) {
        if self.sent == 0 || self.state == SolicitState::Done {
            return;
        }
        trace!(sent = self.sent, "Router solicitation finished");
        self.state = SolicitState::Done;
        self.timeout = 0;
    }

    pub fn reset(&mut self) {
        self.state = SolicitState::Idle;
        self.timeout = 0;
        self.sent = 0;
    }

    /// Advance by `elapsed` ms; true when an RS is due now
    pub fn tick(&mut self, elapsed: u32) -> bool {
        if !matches!(self.state, SolicitState::Delaying | SolicitState::Soliciting) {
            return false;
        }

        self.timeout = self.timeout.saturating_sub(elapsed);
        if self.timeout > 0 {
            return false;
        }

        if self.sent >= self.max {
            debug!(sent = self.sent, "No Router Advertisement received");
            self.state = SolicitState::Done;
            return false;
        }

        self.sent += 1;
        self.state = SolicitState::Soliciting;
        self.timeout = RTR_SOLICITATION_INTERVAL;
        true
    }
}

/// Apply a validated Router Advertisement from `src` (RFC 4861 §6.3.4)
pub(crate) fn apply_router_advertisement(
    ctx: &mut InterfaceNdpContext,
    src: Ipv6Addr,
    ra: &RouterAdvertisement,
    actions: &mut Vec<NdpAction>,
) {
    debug!(
        interface = %ctx.name,
        router = %src,
        lifetime = ra.router_lifetime,
        prefixes = ra.prefixes.len(),
        "Received Router Advertisement"
    );

    if ra.cur_hop_limit != 0 {
        ctx.cur_hop_limit = ra.cur_hop_limit;
    }
    // Re-randomize only when the advertised base changes so that repeated
    // identical RAs leave the interface untouched
    if ra.reachable_time != 0 && ra.reachable_time != ctx.base_reachable_time {
        ctx.base_reachable_time = ra.reachable_time;
        ctx.randomize_reachable_time();
    }
    if ra.retrans_timer != 0 {
        ctx.retrans_timer = ra.retrans_timer;
    }

    update_default_router(ctx, src, ra);

    if let Some(mac) = ra.source_link_addr {
        ctx.learn_neighbor(src, mac, actions);
    }
    ctx.neighbors.set_router(&src, true);

    if let Some(mtu) = ra.mtu {
        if (MIN_MTU..=ctx.link_mtu).contains(&mtu) {
            if mtu != ctx.mtu {
                debug!(interface = %ctx.name, mtu, "Link MTU changed by RA");
                ctx.mtu = mtu;
                ctx.destinations.cap_path_mtu(mtu);
                actions.push(NdpAction::Event(NdpEvent::MtuChanged {
                    interface: ctx.id,
                    mtu,
                }));
            }
        } else {
            trace!(interface = %ctx.name, mtu, "RA MTU option out of range");
        }
    }

    for pio in &ra.prefixes {
        if is_link_local(&pio.prefix) || pio.preferred_lifetime > pio.valid_lifetime {
            trace!(prefix = %pio.prefix, len = pio.prefix_length, "Prefix option ignored");
            continue;
        }

        if pio.on_link_flag {
            if pio.valid_lifetime == 0 {
                let dynamic = ctx
                    .prefixes
                    .find(&pio.prefix, pio.prefix_length)
                    .is_some_and(|e| !e.permanent);
                if dynamic {
                    ctx.prefixes.remove(&pio.prefix, pio.prefix_length);
                    debug!(prefix = %pio.prefix, len = pio.prefix_length, "Prefix withdrawn");
                }
            } else {
                let entry = PrefixEntry {
                    prefix: pio.prefix,
                    prefix_len: pio.prefix_length,
                    on_link: true,
                    autonomous: pio.autonomous_flag,
                    valid_lifetime: lifetime_ms(pio.valid_lifetime),
                    preferred_lifetime: lifetime_ms(pio.preferred_lifetime),
                    permanent: false,
                };
                if let Err(e) = ctx.prefixes.upsert(entry) {
                    debug!(
                        interface = %ctx.name,
                        prefix = %pio.prefix,
                        error = %e,
                        "Prefix not stored"
                    );
                }
            }
        }

        if pio.autonomous_flag {
            actions.push(NdpAction::Event(NdpEvent::AutoconfPrefix {
                interface: ctx.id,
                prefix: pio.clone(),
            }));
        }
    }

    let flags = (ra.managed_flag, ra.other_flag);
    if ctx.managed_config != Some(flags) {
        ctx.managed_config = Some(flags);
        actions.push(NdpAction::Event(NdpEvent::ManagedConfig {
            interface: ctx.id,
            managed: ra.managed_flag,
            other: ra.other_flag,
        }));
    }

    for rdnss in &ra.rdnss {
        actions.push(NdpAction::Event(NdpEvent::DnsServers {
            interface: ctx.id,
            servers: rdnss.servers.clone(),
            lifetime: rdnss.lifetime,
        }));
    }

    for context in &ra.contexts {
        actions.push(NdpAction::Event(NdpEvent::SixlowpanContext {
            interface: ctx.id,
            context: context.clone(),
        }));
    }

    for route in &ra.routes {
        trace!(
            prefix = %route.prefix,
            len = route.prefix_length,
            "Route Information ignored by host"
        );
    }
}

fn update_default_router(ctx: &mut InterfaceNdpContext, src: Ipv6Addr, ra: &RouterAdvertisement) {
    if ra.router_lifetime == 0 {
        let dynamic = ctx.routers.find(&src).is_some_and(|r| !r.permanent);
        if dynamic {
            ctx.routers.remove(&src);
            let flushed = ctx.destinations.invalidate_next_hop(&src);
            debug!(interface = %ctx.name, router = %src, flushed, "Default router withdrawn");
        }
        return;
    }

    let entry = RouterEntry {
        addr: src,
        lifetime: lifetime_ms(u32::from(ra.router_lifetime)),
        preference: ra.preference,
        permanent: false,
    };
    match ctx.routers.upsert(entry) {
        Ok(Some(evicted)) => {
            ctx.destinations.invalidate_next_hop(&evicted.addr);
        }
        Ok(None) => {}
        Err(e) => {
            debug!(interface = %ctx.name, router = %src, error = %e, "Default router not stored")
        }
    }
    ctx.solicitor.stop();
}
