//! Address resolution and Neighbor Unreachability Detection

use crate::harness::{addr, make_settings, Harness, Sent, IFACE, OUR_MAC, PEER_MAC};
use ndisc::ndp::{NeighborState, PacketOrigin, Resolution};
use ndisc::protocol::icmpv6::{NdpMessage, NeighborAdvertisement, NeighborSolicitation};
use ndisc::protocol::ipv6::solicited_node;
use ndisc::protocol::MacAddr;
use ndisc::Error;
use std::net::Ipv6Addr;

fn neighbor_state(h: &Harness, ip: &Ipv6Addr) -> Option<NeighborState> {
    h.stack
        .with_interface(IFACE, |ctx| ctx.neighbors().find(ip).map(|e| e.state))
        .unwrap()
}

fn solicited_na(target: Ipv6Addr, mac: MacAddr) -> NdpMessage {
    NdpMessage::NeighborAdvertisement(NeighborAdvertisement::new(
        target,
        Some(mac),
        false,
        true,
        true,
    ))
}

fn transmitted(sent: &[Sent]) -> Vec<(MacAddr, Vec<u8>)> {
    sent.iter()
        .filter_map(|s| match s {
            Sent::Packet { link_dst, packet, .. } => Some((*link_dst, packet.clone())),
            _ => None,
        })
        .collect()
}

/// Resolving an unknown on-link neighbor sends one multicast NS and
/// creates an Incomplete entry
#[test]
fn test_resolve_unknown_neighbor() {
    let h = Harness::new(make_settings());
    let peer = addr("fe80::2");

    let result = h.stack.resolve(IFACE, &peer).unwrap();
    assert_eq!(result, Resolution::InProgress);

    let sent = h.link.take();
    assert_eq!(sent.len(), 1, "exactly one solicitation expected: {:?}", sent);
    assert_eq!(
        sent[0],
        Sent::Ndp {
            interface: IFACE,
            src: h.link_local(),
            dst: solicited_node(&peer),
            link_dst: MacAddr::ipv6_multicast(&solicited_node(&peer)),
            message: NdpMessage::NeighborSolicitation(NeighborSolicitation::new(
                peer,
                Some(OUR_MAC),
            )),
        }
    );
    assert_eq!(neighbor_state(&h, &peer), Some(NeighborState::Incomplete));

    // A second lookup waits on the same entry
    assert_eq!(h.stack.resolve(IFACE, &peer).unwrap(), Resolution::InProgress);
    assert!(h.link.take().is_empty(), "no extra NS while Incomplete");
}

/// A solicited NA completes resolution and releases queued packets in order
#[test]
fn test_solicited_na_flushes_queue() {
    let h = Harness::new(make_settings());
    let peer = addr("fe80::2");

    for tag in 1..=3u8 {
        h.stack
            .enqueue(IFACE, &peer, vec![tag], PacketOrigin::Local)
            .unwrap();
    }
    h.link.take();

    h.receive(peer, h.link_local(), solicited_na(peer, PEER_MAC));

    assert_eq!(neighbor_state(&h, &peer), Some(NeighborState::Reachable));
    let sent = transmitted(&h.link.take());
    assert_eq!(
        sent,
        vec![
            (PEER_MAC, vec![1]),
            (PEER_MAC, vec![2]),
            (PEER_MAC, vec![3]),
        ]
    );

    assert_eq!(
        h.stack.resolve(IFACE, &peer).unwrap(),
        Resolution::Address(PEER_MAC)
    );
}

/// The pending queue keeps only the newest packets
#[test]
fn test_pending_queue_bound() {
    let h = Harness::new(make_settings());
    let peer = addr("fe80::2");
    let limit = h.stack.settings().neighbor_queue_len;

    for tag in 0..(limit as u8 + 2) {
        h.stack
            .enqueue(IFACE, &peer, vec![tag], PacketOrigin::Local)
            .unwrap();
    }
    let queued = h
        .stack
        .with_interface(IFACE, |ctx| ctx.neighbors().find(&peer).unwrap().queue_len())
        .unwrap();
    assert_eq!(queued, limit);
    assert_eq!(h.stack.metrics().queue_drops.get(), 2);

    h.link.take();
    h.receive(peer, h.link_local(), solicited_na(peer, PEER_MAC));

    let tags: Vec<u8> = transmitted(&h.link.take())
        .into_iter()
        .map(|(_, p)| p[0])
        .collect();
    assert_eq!(tags, vec![2, 3, 4], "oldest packets dropped first");
}

/// Resolution gives up after three solicitations; forwarded packets are
/// reported back to the interface they came from
#[test]
fn test_resolution_failure() {
    let h = Harness::new(make_settings());
    let peer = addr("fe80::2");

    h.stack
        .enqueue(IFACE, &peer, vec![0xaa], PacketOrigin::Forwarded { ingress: 2 })
        .unwrap();

    h.advance(2_800);
    assert_eq!(neighbor_state(&h, &peer), Some(NeighborState::Incomplete));

    h.advance(200);
    assert_eq!(neighbor_state(&h, &peer), None, "entry removed after last retry");

    let sent = h.link.take();
    let solicitations = Harness::ndp_messages(&sent)
        .into_iter()
        .filter(|m| matches!(m, NdpMessage::NeighborSolicitation(ns) if ns.target_addr == peer))
        .count();
    assert_eq!(solicitations, 3);
    assert!(sent.contains(&Sent::Unreachable {
        interface: 2,
        packet: vec![0xaa],
    }));
    assert_eq!(h.stack.metrics().resolution_failures.get(), 1);
}

/// Locally generated packets are dropped silently when resolution fails
#[test]
fn test_resolution_failure_local_packet() {
    let h = Harness::new(make_settings());
    let peer = addr("fe80::2");

    h.stack
        .enqueue(IFACE, &peer, vec![1], PacketOrigin::Local)
        .unwrap();
    h.advance(3_000);

    let sent = h.link.take();
    assert!(
        !sent.iter().any(|s| matches!(s, Sent::Unreachable { .. } | Sent::Packet { .. })),
        "local packet must not be reported: {:?}",
        sent
    );
}

/// An NS from a neighbor is answered and leaves a Stale entry that is
/// probed after the Delay period
#[test]
fn test_stale_neighbor_probe() {
    let h = Harness::new(make_settings());
    let peer = addr("fe80::2");
    let ours = h.link_local();

    h.receive(
        peer,
        solicited_node(&ours),
        NdpMessage::NeighborSolicitation(NeighborSolicitation::new(ours, Some(PEER_MAC))),
    );

    let sent = h.link.take();
    assert_eq!(
        sent,
        vec![Sent::Ndp {
            interface: IFACE,
            src: ours,
            dst: peer,
            link_dst: PEER_MAC,
            message: NdpMessage::NeighborAdvertisement(NeighborAdvertisement::new(
                ours,
                Some(OUR_MAC),
                false,
                true,
                true
            )),
        }]
    );
    assert_eq!(neighbor_state(&h, &peer), Some(NeighborState::Stale));

    // Sending to a Stale neighbor works immediately and starts the Delay timer
    assert_eq!(
        h.stack.resolve(IFACE, &peer).unwrap(),
        Resolution::Address(PEER_MAC)
    );
    assert_eq!(neighbor_state(&h, &peer), Some(NeighborState::Delay));

    h.advance(5_000);
    assert_eq!(neighbor_state(&h, &peer), Some(NeighborState::Probe));
    let sent = h.link.take();
    assert!(
        matches!(
            &sent[..],
            [Sent::Ndp { dst, link_dst, message: NdpMessage::NeighborSolicitation(ns), .. }]
                if *dst == peer && *link_dst == PEER_MAC && ns.target_addr == peer
        ),
        "expected one unicast probe: {:?}",
        sent
    );

    h.receive(peer, ours, solicited_na(peer, PEER_MAC));
    assert_eq!(neighbor_state(&h, &peer), Some(NeighborState::Reachable));
}

/// Upper-layer hints skip the probe entirely
#[test]
fn test_reachability_hint() {
    let h = Harness::new(make_settings());
    let peer = addr("fe80::2");
    let ours = h.link_local();

    assert!(!h.stack.reachability_hint(IFACE, &peer).unwrap(), "unknown neighbor");

    h.receive(
        peer,
        solicited_node(&ours),
        NdpMessage::NeighborSolicitation(NeighborSolicitation::new(ours, Some(PEER_MAC))),
    );
    h.stack.resolve(IFACE, &peer).unwrap();
    assert!(h.stack.reachability_hint(IFACE, &peer).unwrap());
    assert_eq!(neighbor_state(&h, &peer), Some(NeighborState::Reachable));

    h.link.take();
    h.advance(5_000);
    assert!(h.link.take().is_empty(), "no probe for a confirmed neighbor");
}

/// Multicast destinations map directly to 33:33 addresses
#[test]
fn test_multicast_destination() {
    let h = Harness::new(make_settings());
    let group = addr("ff02::1");

    assert_eq!(
        h.stack.resolve(IFACE, &group).unwrap(),
        Resolution::Address(MacAddr([0x33, 0x33, 0, 0, 0, 1]))
    );
    h.stack
        .enqueue(IFACE, &group, vec![7], PacketOrigin::Local)
        .unwrap();
    assert_eq!(
        transmitted(&h.link.take()),
        vec![(MacAddr([0x33, 0x33, 0, 0, 0, 1]), vec![7])]
    );
}

/// Without an on-link prefix or default router there is no next hop
#[test]
fn test_no_route() {
    let h = Harness::new(make_settings());
    let remote = addr("2001:db8:99::1");

    let err = h
        .stack
        .enqueue(IFACE, &remote, vec![9], PacketOrigin::Forwarded { ingress: 3 })
        .unwrap_err();
    assert!(matches!(err, Error::NoRoute), "unexpected error: {:?}", err);
    assert_eq!(
        h.link.take(),
        vec![Sent::Unreachable {
            interface: 3,
            packet: vec![9],
        }]
    );
}

/// Losing the link discards pending packets and learned neighbors
#[test]
fn test_link_down_discards() {
    let h = Harness::new(make_settings());
    let peer = addr("fe80::2");

    h.stack
        .enqueue(IFACE, &peer, vec![1], PacketOrigin::Local)
        .unwrap();
    h.link.take();

    h.stack.link_down(IFACE).unwrap();
    assert!(h.link.take().is_empty(), "nothing sent on link down");
    assert_eq!(neighbor_state(&h, &peer), None);
    assert_eq!(h.stack.resolve(IFACE, &peer).unwrap(), Resolution::Failed);

    // Messages are ignored while down
    h.receive(peer, h.link_local(), solicited_na(peer, PEER_MAC));
    assert_eq!(neighbor_state(&h, &peer), None);

    h.stack.link_up(IFACE).unwrap();
    assert_eq!(h.stack.resolve(IFACE, &peer).unwrap(), Resolution::InProgress);
}
