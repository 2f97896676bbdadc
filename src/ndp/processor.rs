//! Inbound NDP message processing
//!
//! Handles validation (RFC 4861 §6.1, §7.1, §8.1) and the resulting table
//! updates for Neighbor Solicitation/Advertisement, Router
//! Solicitation/Advertisement and Redirect.

use super::interface::InterfaceNdpContext;
use super::neighbor_cache::AdvertFlags;
use super::router_discovery::apply_router_advertisement;
use super::{NdpAction, NDP_HOP_LIMIT};
use crate::protocol::icmpv6::{
    Icmpv6Packet, Icmpv6Type, NdpMessage, NeighborAdvertisement, NeighborSolicitation, Redirect,
    RouterSolicitation,
};
use crate::protocol::ipv6::{is_link_local, is_solicited_node, ALL_NODES};
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv6Addr;
use tracing::{debug, trace, warn};

/// IPv6 header fields an NDP message is validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoHeader {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub hop_limit: u8,
}

impl PseudoHeader {
    /// Header of a well-formed NDP packet (hop limit 255)
    pub fn new(src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        Self {
            src,
            dst,
            hop_limit: NDP_HOP_LIMIT,
        }
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidPacket(reason.to_string())
}

/// Decode and validate without touching any table
fn decode(hdr: &PseudoHeader, bytes: &[u8], expected: Option<Icmpv6Type>) -> Result<NdpMessage> {
    if hdr.hop_limit != NDP_HOP_LIMIT {
        return Err(Error::InvalidPacket(format!(
            "hop limit {} instead of {}",
            hdr.hop_limit, NDP_HOP_LIMIT
        )));
    }

    let packet = Icmpv6Packet::parse(bytes)?;
    let message = NdpMessage::parse(&packet)?;
    if expected.is_some_and(|t| t != message.msg_type()) {
        return Err(invalid("unexpected message type"));
    }

    match &message {
        NdpMessage::NeighborSolicitation(ns) => {
            if ns.target_addr.is_multicast() {
                return Err(invalid("NS target is multicast"));
            }
            if hdr.src.is_unspecified() {
                if !is_solicited_node(&hdr.dst) {
                    return Err(invalid("DAD NS not sent to a solicited-node group"));
                }
                if ns.source_link_addr.is_some() {
                    return Err(invalid("DAD NS carries a source link-layer address"));
                }
            }
        }
        NdpMessage::NeighborAdvertisement(na) => {
            if na.target_addr.is_multicast() {
                return Err(invalid("NA target is multicast"));
            }
            if hdr.dst.is_multicast() && na.solicited_flag {
                return Err(invalid("multicast NA with the solicited flag"));
            }
        }
        NdpMessage::RouterSolicitation(rs) => {
            if hdr.src.is_unspecified() && rs.source_link_addr.is_some() {
                return Err(invalid("RS from :: carries a source link-layer address"));
            }
        }
        NdpMessage::RouterAdvertisement(_) => {
            if !is_link_local(&hdr.src) {
                return Err(invalid("RA source is not link-local"));
            }
        }
        NdpMessage::Redirect(redirect) => {
            if !is_link_local(&hdr.src) {
                return Err(invalid("Redirect source is not link-local"));
            }
            if redirect.dest_addr.is_multicast() {
                return Err(invalid("Redirect destination is multicast"));
            }
            if !is_link_local(&redirect.target_addr) && !redirect.is_on_link() {
                return Err(invalid("Redirect target is neither link-local nor the destination"));
            }
        }
    }

    Ok(message)
}

/// Process one inbound NDP message
///
/// Invalid messages are dropped silently and only counted.
pub(crate) fn process_message(
    ctx: &mut InterfaceNdpContext,
    hdr: &PseudoHeader,
    bytes: &[u8],
    expected: Option<Icmpv6Type>,
    actions: &mut Vec<NdpAction>,
) {
    if !ctx.link_up {
        trace!(interface = %ctx.name, "Link down, NDP message ignored");
        return;
    }

    let message = match decode(hdr, bytes, expected) {
        Ok(message) => message,
        Err(e) => {
            trace!(interface = %ctx.name, src = %hdr.src, error = %e, "NDP message dropped");
            ctx.metrics.record_drop(&ctx.name);
            return;
        }
    };
    ctx.metrics
        .record_rx(&ctx.name, message.msg_type(), bytes.len());

    let result = match &message {
        NdpMessage::NeighborSolicitation(ns) => {
            handle_neighbor_solicitation(ctx, hdr, ns, actions);
            Ok(())
        }
        NdpMessage::NeighborAdvertisement(na) => {
            handle_neighbor_advertisement(ctx, na, actions);
            Ok(())
        }
        NdpMessage::RouterSolicitation(rs) => {
            handle_router_solicitation(ctx, hdr, rs, actions);
            Ok(())
        }
        NdpMessage::RouterAdvertisement(ra) => {
            apply_router_advertisement(ctx, hdr.src, ra, actions);
            Ok(())
        }
        NdpMessage::Redirect(redirect) => handle_redirect(ctx, hdr, redirect, actions),
    };

    if let Err(e) = result {
        trace!(interface = %ctx.name, src = %hdr.src, error = %e, "NDP message rejected");
        ctx.metrics.record_drop(&ctx.name);
    }
}

fn handle_neighbor_solicitation(
    ctx: &mut InterfaceNdpContext,
    hdr: &PseudoHeader,
    ns: &NeighborSolicitation,
    actions: &mut Vec<NdpAction>,
) {
    let target = ns.target_addr;

    if ctx.addresses.is_tentative(&target) {
        // Another node probing the same tentative address
        if hdr.src.is_unspecified() {
            ctx.duplicate_detected(&target, actions);
        } else {
            trace!(interface = %ctx.name, target = %target, "NS for tentative address ignored");
        }
        return;
    }

    let Some(entry) = ctx.addresses.find(&target) else {
        trace!(interface = %ctx.name, target = %target, "NS target is not ours");
        return;
    };
    if !entry.state.is_valid() {
        return;
    }
    let anycast = entry.anycast;

    if hdr.src.is_unspecified() {
        // Defend an address we already own (RFC 4862 §5.4.3)
        debug!(interface = %ctx.name, target = %target, "Defending address against DAD probe");
        let na = NeighborAdvertisement::new(target, Some(ctx.mac), ctx.is_router(), false, true);
        ctx.send_na(ALL_NODES, MacAddr::ipv6_multicast(&ALL_NODES), na, actions);
        return;
    }

    if let Some(mac) = ns.source_link_addr {
        ctx.learn_neighbor(hdr.src, mac, actions);
    }

    let link_dst = ns
        .source_link_addr
        .or_else(|| ctx.neighbors.find(&hdr.src).and_then(|n| n.resolved_addr()));
    let Some(link_dst) = link_dst else {
        debug!(interface = %ctx.name, src = %hdr.src, "No link-layer address to answer NS");
        return;
    };

    let na = NeighborAdvertisement::new(target, Some(ctx.mac), ctx.is_router(), true, !anycast);
    ctx.send_na(hdr.src, link_dst, na, actions);
}

/// RFC 4861 §6.2.6; hosts drop Router Solicitations
fn handle_router_solicitation(
    ctx: &mut InterfaceNdpContext,
    hdr: &PseudoHeader,
    rs: &RouterSolicitation,
    actions: &mut Vec<NdpAction>,
) {
    if !ctx.is_router() {
        trace!(interface = %ctx.name, src = %hdr.src, "Router Solicitation ignored by host");
        return;
    }

    if let Some(mac) = rs.source_link_addr {
        ctx.learn_neighbor(hdr.src, mac, actions);
    }
    ctx.neighbors.set_router(&hdr.src, false);
    ctx.answer_solicitation();
    debug!(
        interface = %ctx.name,
        src = %hdr.src,
        "Router Solicitation answered"
    );
}

fn handle_neighbor_advertisement(
    ctx: &mut InterfaceNdpContext,
    na: &NeighborAdvertisement,
    actions: &mut Vec<NdpAction>,
) {
    let target = na.target_addr;

    if ctx.addresses.is_tentative(&target) {
        ctx.duplicate_detected(&target, actions);
        return;
    }
    if ctx.addresses.is_valid(&target) {
        warn!(
            interface = %ctx.name,
            target = %target,
            "NA from another node for one of our addresses"
        );
        return;
    }

    let flags = AdvertFlags {
        router: na.router_flag,
        solicited: na.solicited_flag,
        overrides: na.override_flag,
    };
    let result = ctx.neighbors.advertise(
        &target,
        na.target_link_addr,
        flags,
        ctx.now,
        ctx.reachable_time,
    );

    if result.router_cleared {
        if ctx.routers.find(&target).is_some_and(|r| !r.permanent) {
            ctx.routers.remove(&target);
        }
        let flushed = ctx.destinations.invalidate_next_hop(&target);
        debug!(
            interface = %ctx.name,
            neighbor = %target,
            flushed,
            "Neighbor is no longer a router"
        );
    }

    if let Some(mac) = result.link_addr {
        ctx.transmit_all(result.flushed, mac, actions);
    }
}

fn handle_redirect(
    ctx: &mut InterfaceNdpContext,
    hdr: &PseudoHeader,
    redirect: &Redirect,
    actions: &mut Vec<NdpAction>,
) -> Result<()> {
    let dest = redirect.dest_addr;
    let target = redirect.target_addr;

    let from_first_hop = match ctx.destinations.find(&dest) {
        Some(entry) => entry.next_hop == hdr.src,
        None => ctx.routers.contains(&hdr.src),
    };
    if !from_first_hop {
        return Err(invalid("Redirect not sent by the current first hop"));
    }

    ctx.destinations
        .update_next_hop(dest, target, ctx.mtu, ctx.now)?;
    debug!(interface = %ctx.name, dest = %dest, target = %target, "Redirect accepted");

    if let Some(mac) = redirect.target_link_addr {
        ctx.learn_neighbor(target, mac, actions);
    }
    if !redirect.is_on_link() {
        ctx.neighbors.set_router(&target, true);
    }
    Ok(())
}
