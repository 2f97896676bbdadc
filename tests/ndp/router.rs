//! Router and prefix discovery

use crate::harness::{addr, make_settings, Harness, Sent, IFACE, ROUTER_MAC};
use ndisc::ndp::{NdpEvent, NeighborState, PacketOrigin, PrefixEntry, Resolution, RouterEntry};
use ndisc::protocol::icmpv6::{NdpMessage, RouterAdvertisement};
use ndisc::protocol::ipv6::{ALL_NODES, ALL_ROUTERS};
use ndisc::protocol::ndp_option::{PrefixInformation, RouterPreference};
use ndisc::Error;
use std::net::Ipv6Addr;

fn make_ra(lifetime: u16) -> RouterAdvertisement {
    RouterAdvertisement::new(64, false, false, lifetime, 0, 0)
        .with_source_link_addr(ROUTER_MAC)
        .with_prefix(PrefixInformation::new(
            addr("2001:db8::"),
            64,
            true,
            true,
            86400,
            14400,
        ))
}

fn send_ra(h: &Harness, src: Ipv6Addr, ra: RouterAdvertisement) {
    h.receive(src, ALL_NODES, NdpMessage::RouterAdvertisement(ra));
}

fn routers(h: &Harness) -> Vec<RouterEntry> {
    h.stack
        .with_interface(IFACE, |ctx| ctx.routers().iter().cloned().collect())
        .unwrap()
}

fn prefixes(h: &Harness) -> Vec<PrefixEntry> {
    h.stack
        .with_interface(IFACE, |ctx| ctx.prefixes().iter().cloned().collect())
        .unwrap()
}

fn next_hop(h: &Harness, dest: &Ipv6Addr) -> Option<Ipv6Addr> {
    h.stack
        .with_interface(IFACE, |ctx| ctx.destinations().find(dest).map(|e| e.next_hop))
        .unwrap()
}

/// RA lifetimes are stored in milliseconds and the router is dropped,
/// together with the destinations using it, once its lifetime runs out
#[test]
fn test_router_lifetime_expiry() {
    let h = Harness::new(make_settings());
    let router = addr("fe80::1");
    let remote = addr("2001:db8:1::1");

    send_ra(&h, router, make_ra(1800));

    let list = routers(&h);
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].addr, router);
    assert_eq!(list[0].lifetime, 1_800_000);

    let prefix = prefixes(&h)
        .into_iter()
        .find(|p| p.prefix == addr("2001:db8::"))
        .expect("prefix learned");
    assert_eq!(prefix.prefix_len, 64);
    assert_eq!(prefix.valid_lifetime, 86_400_000);
    assert_eq!(prefix.preferred_lifetime, 14_400_000);

    let events = h.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        NdpEvent::AutoconfPrefix { prefix, .. } if prefix.prefix == addr("2001:db8::")
    )));

    // Off-link traffic goes through the router, learned Stale from the SLLAO
    assert_eq!(
        h.stack.resolve(IFACE, &remote).unwrap(),
        Resolution::Address(ROUTER_MAC)
    );
    assert_eq!(next_hop(&h, &remote), Some(router));

    for _ in 0..1799 {
        h.stack.tick_elapsed(1000);
    }
    assert_eq!(routers(&h).len(), 1, "router alive until its lifetime ends");

    h.stack.resolve(IFACE, &remote).unwrap();
    assert_eq!(next_hop(&h, &remote), Some(router));

    h.stack.tick_elapsed(1000);
    assert!(routers(&h).is_empty(), "router expired after 1800 s");
    assert_eq!(next_hop(&h, &remote), None, "destinations through the router flushed");
    assert_eq!(prefixes(&h).len(), 1, "prefix outlives the router");

    let err = h.stack.resolve(IFACE, &remote).unwrap_err();
    assert!(matches!(err, Error::NoRoute), "unexpected error: {:?}", err);
}

/// On-link prefixes make destinations their own next hop
#[test]
fn test_prefix_on_link() {
    let h = Harness::new(make_settings());
    send_ra(&h, addr("fe80::1"), make_ra(0));

    assert!(routers(&h).is_empty(), "zero lifetime is not a default router");

    let dest = addr("2001:db8::42");
    assert_eq!(h.stack.resolve(IFACE, &dest).unwrap(), Resolution::InProgress);
    assert_eq!(next_hop(&h, &dest), Some(dest));
}

/// Applying the same RA twice leaves identical state
#[test]
fn test_router_advertisement_idempotent() {
    let h = Harness::new(make_settings());
    let router = addr("fe80::1");
    let ra = RouterAdvertisement::new(32, true, false, 600, 20_000, 500)
        .with_source_link_addr(ROUTER_MAC)
        .with_mtu(1400)
        .with_prefix(PrefixInformation::new(
            addr("2001:db8::"),
            64,
            true,
            true,
            3600,
            1800,
        ));

    let snapshot = |h: &Harness| {
        h.stack
            .with_interface(IFACE, |ctx| {
                (
                    ctx.routers().iter().cloned().collect::<Vec<_>>(),
                    ctx.prefixes().iter().cloned().collect::<Vec<_>>(),
                    ctx.cur_hop_limit(),
                    ctx.base_reachable_time(),
                    ctx.reachable_time(),
                    ctx.retrans_timer(),
                    ctx.mtu(),
                )
            })
            .unwrap()
    };

    send_ra(&h, router, ra.clone());
    let first = snapshot(&h);
    let first_events = h.take_events();

    send_ra(&h, router, ra);
    let second = snapshot(&h);
    let second_events = h.take_events();

    assert_eq!(first, second);
    assert_eq!(first.2, 32);
    assert_eq!(first.3, 20_000);
    assert_eq!(first.5, 500);
    assert_eq!(first.6, 1400);

    let managed = |events: &[NdpEvent]| {
        events
            .iter()
            .filter(|e| matches!(e, NdpEvent::ManagedConfig { .. }))
            .count()
    };
    assert_eq!(managed(&first_events), 1);
    assert_eq!(managed(&second_events), 0, "unchanged M/O flags not reported again");
    assert!(first_events
        .iter()
        .any(|e| matches!(e, NdpEvent::MtuChanged { mtu: 1400, .. })));
    assert!(!second_events
        .iter()
        .any(|e| matches!(e, NdpEvent::MtuChanged { .. })));
}

/// The router list never grows past its capacity and replaces the entry
/// closest to expiry
#[test]
fn test_router_list_capacity() {
    let h = Harness::new(make_settings());
    let capacity = h.stack.settings().router_list_size;
    assert_eq!(capacity, 3);

    send_ra(&h, addr("fe80::1"), RouterAdvertisement::new(0, false, false, 300, 0, 0));
    send_ra(&h, addr("fe80::2"), RouterAdvertisement::new(0, false, false, 100, 0, 0));
    send_ra(&h, addr("fe80::3"), RouterAdvertisement::new(0, false, false, 200, 0, 0));
    send_ra(&h, addr("fe80::4"), RouterAdvertisement::new(0, false, false, 400, 0, 0));

    let list = routers(&h);
    assert_eq!(list.len(), capacity);
    assert!(list.iter().all(|r| r.addr != addr("fe80::2")), "shortest lifetime replaced");
    assert!(list.iter().any(|r| r.addr == addr("fe80::4")));

    // Each address appears once
    let mut addrs: Vec<_> = list.iter().map(|r| r.addr).collect();
    addrs.sort();
    addrs.dedup();
    assert_eq!(addrs.len(), list.len());

    // Zero lifetime withdraws the router
    send_ra(&h, addr("fe80::1"), RouterAdvertisement::new(0, false, false, 0, 0, 0));
    assert_eq!(routers(&h).len(), capacity - 1);
}

/// Higher preference wins among routers of equal reachability
#[test]
fn test_router_preference() {
    let h = Harness::new(make_settings());
    let low = addr("fe80::1");
    let high = addr("fe80::2");

    send_ra(
        &h,
        low,
        RouterAdvertisement::new(0, false, false, 600, 0, 0).with_preference(RouterPreference::Low),
    );
    send_ra(
        &h,
        high,
        RouterAdvertisement::new(0, false, false, 600, 0, 0)
            .with_preference(RouterPreference::High),
    );

    let remote = addr("2001:db8:5::1");
    h.stack.resolve(IFACE, &remote).unwrap();
    assert_eq!(next_hop(&h, &remote), Some(high));
}

/// RAs from a non-link-local source are dropped
#[test]
fn test_router_advertisement_global_source() {
    let h = Harness::new(make_settings());

    send_ra(&h, addr("2001:db8::1"), make_ra(1800));

    assert!(routers(&h).is_empty());
    assert_eq!(h.stack.metrics().messages_dropped.get(), 1);
}

/// Router Solicitation runs on link-up and stops at the first RA
#[test]
fn test_router_solicitation() {
    let mut settings = make_settings();
    settings.router_solicitations = true;

    let idle = Harness::new(settings.clone());
    idle.advance(13_000);
    let sent = idle.link.take();
    let solicitations: Vec<_> = sent
        .iter()
        .filter(|s| matches!(s, Sent::Ndp { message: NdpMessage::RouterSolicitation(_), .. }))
        .collect();
    assert_eq!(solicitations.len(), 3, "at most three solicitations");
    assert!(solicitations.iter().all(|s| matches!(
        s,
        Sent::Ndp { dst, src, .. } if *dst == ALL_ROUTERS && *src == idle.link_local()
    )));

    let h = Harness::new(settings);
    h.advance(1_200);
    assert_eq!(h.link.take().len(), 1, "first solicitation after the random delay");

    send_ra(&h, addr("fe80::1"), make_ra(1800));
    h.advance(12_000);
    assert!(
        !h.link
            .take()
            .iter()
            .any(|s| matches!(s, Sent::Ndp { message: NdpMessage::RouterSolicitation(_), .. })),
        "solicitation stops once a router answered"
    );
}

/// Configured routers and prefixes survive an RA withdrawing them
#[test]
fn test_static_router_and_prefix() {
    let h = Harness::new(make_settings());
    let router = addr("fe80::1");

    h.stack
        .add_default_router(IFACE, router, RouterPreference::Medium)
        .unwrap();
    h.stack.add_prefix(IFACE, addr("2001:db8::"), 64).unwrap();

    let withdraw = RouterAdvertisement::new(0, false, false, 0, 0, 0).with_prefix(
        PrefixInformation::new(addr("2001:db8::"), 64, true, false, 0, 0),
    );
    send_ra(&h, router, withdraw);

    assert_eq!(routers(&h).len(), 1);
    assert!(routers(&h)[0].permanent);
    assert_eq!(prefixes(&h).len(), 1);

    h.stack.remove_default_router(IFACE, &router).unwrap();
    assert!(routers(&h).is_empty());
    let err = h.stack.remove_default_router(IFACE, &router).unwrap_err();
    assert!(matches!(err, Error::NotFound));

    let err = h
        .stack
        .add_default_router(IFACE, addr("2001:db8::1"), RouterPreference::Medium)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
}

/// An RA whose SLLAO completes a pending resolution sends the queued
/// packet and leaves the router in Delay
#[test]
fn test_ra_completes_resolution() {
    let h = Harness::new(make_settings());
    let router = addr("fe80::1");

    assert_eq!(h.stack.resolve(IFACE, &router).unwrap(), Resolution::InProgress);
    h.stack
        .enqueue(IFACE, &router, vec![0x42], PacketOrigin::Local)
        .unwrap();
    h.link.take();

    send_ra(&h, router, make_ra(1800));

    let packets: Vec<_> = h
        .link
        .take()
        .into_iter()
        .filter_map(|s| match s {
            Sent::Packet { link_dst, packet, .. } => Some((link_dst, packet)),
            _ => None,
        })
        .collect();
    assert_eq!(packets, vec![(ROUTER_MAC, vec![0x42])]);

    let state = h
        .stack
        .with_interface(IFACE, |ctx| ctx.neighbors().find(&router).map(|e| e.state))
        .unwrap();
    assert_eq!(state, Some(NeighborState::Delay));
}
