//! Redirect handling

use crate::harness::{addr, make_settings, Harness, IFACE, PEER_MAC, ROUTER_MAC};
use ndisc::ndp::{NeighborState, Resolution};
use ndisc::protocol::icmpv6::{NdpMessage, Redirect, RouterAdvertisement};
use ndisc::protocol::ipv6::ALL_NODES;
use std::net::Ipv6Addr;

/// Harness with fe80::1 as the only default router
fn make_routed_harness() -> Harness {
    let h = Harness::new(make_settings());
    h.receive(
        addr("fe80::1"),
        ALL_NODES,
        NdpMessage::RouterAdvertisement(
            RouterAdvertisement::new(64, false, false, 1800, 0, 0)
                .with_source_link_addr(ROUTER_MAC),
        ),
    );
    h.link.take();
    h.take_events();
    h
}

fn next_hop(h: &Harness, dest: &Ipv6Addr) -> Option<Ipv6Addr> {
    h.stack
        .with_interface(IFACE, |ctx| ctx.destinations().find(dest).map(|e| e.next_hop))
        .unwrap()
}

fn send_redirect(h: &Harness, src: Ipv6Addr, redirect: Redirect) {
    h.receive(src, h.link_local(), NdpMessage::Redirect(redirect));
}

/// The first hop can point a destination at a better router
#[test]
fn test_redirect_to_router() {
    let h = make_routed_harness();
    let remote = addr("2001:db8:1::1");
    let better = addr("fe80::3");

    h.stack.resolve(IFACE, &remote).unwrap();
    assert_eq!(next_hop(&h, &remote), Some(addr("fe80::1")));

    send_redirect(&h, addr("fe80::1"), Redirect::new(better, remote, Some(PEER_MAC)));

    assert_eq!(next_hop(&h, &remote), Some(better));
    let (state, is_router) = h
        .stack
        .with_interface(IFACE, |ctx| {
            let entry = ctx.neighbors().find(&better).unwrap();
            (entry.state, entry.is_router)
        })
        .unwrap();
    assert_eq!(state, NeighborState::Stale);
    assert!(is_router);

    assert_eq!(
        h.stack.resolve(IFACE, &remote).unwrap(),
        Resolution::Address(PEER_MAC)
    );
}

/// Target equal to the destination means the destination is on-link
#[test]
fn test_redirect_on_link() {
    let h = make_routed_harness();
    let remote = addr("2001:db8:1::1");

    send_redirect(&h, addr("fe80::1"), Redirect::new(remote, remote, Some(PEER_MAC)));

    assert_eq!(next_hop(&h, &remote), Some(remote));
    let is_router = h
        .stack
        .with_interface(IFACE, |ctx| ctx.neighbors().find(&remote).map(|e| e.is_router))
        .unwrap();
    assert_eq!(is_router, Some(false));
}

/// Redirects from anyone but the current first hop are ignored
#[test]
fn test_redirect_from_wrong_router() {
    let h = make_routed_harness();
    let remote = addr("2001:db8:1::1");

    h.stack.resolve(IFACE, &remote).unwrap();
    let dropped = h.stack.metrics().messages_dropped.get();

    send_redirect(&h, addr("fe80::9"), Redirect::new(addr("fe80::3"), remote, None));

    assert_eq!(next_hop(&h, &remote), Some(addr("fe80::1")));
    assert_eq!(h.stack.metrics().messages_dropped.get(), dropped + 1);
}

/// A redirect with a global target that differs from the destination is
/// malformed
#[test]
fn test_redirect_global_target() {
    let h = make_routed_harness();
    let remote = addr("2001:db8:1::1");

    h.stack.resolve(IFACE, &remote).unwrap();
    send_redirect(
        &h,
        addr("fe80::1"),
        Redirect::new(addr("2001:db8:2::1"), remote, None),
    );

    assert_eq!(next_hop(&h, &remote), Some(addr("fe80::1")));
}
