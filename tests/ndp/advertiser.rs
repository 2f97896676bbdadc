//! Router mode: advertisements, solicitations and Redirects sent

use crate::harness::{
    addr, make_settings, Harness, RecordingLink, Sent, IFACE, OUR_MAC, PEER_MAC, ROUTER_MAC,
};
use ndisc::config;
use ndisc::ndp::{AdvertisedPrefix, NdpStack, NeighborState, RouterAdvSettings};
use ndisc::protocol::icmpv6::{
    NdpMessage, NeighborSolicitation, RouterAdvertisement, RouterSolicitation,
};
use ndisc::protocol::ipv6::{solicited_node, ALL_NODES, ALL_ROUTERS, HEADER_LEN, MIN_MTU};
use ndisc::protocol::ndp_option::RouterPreference;
use ndisc::protocol::MacAddr;
use ndisc::Error;
use std::net::Ipv6Addr;
use std::sync::Arc;

fn make_router(settings: RouterAdvSettings) -> Harness {
    let h = Harness::new(make_settings());
    h.stack.start_router_advertisements(IFACE, settings).unwrap();
    h
}

/// (source, destination, link destination, advertisement) of every RA sent
fn advertisements(sent: &[Sent]) -> Vec<(Ipv6Addr, Ipv6Addr, MacAddr, RouterAdvertisement)> {
    sent.iter()
        .filter_map(|s| match s {
            Sent::Ndp {
                src,
                dst,
                link_dst,
                message: NdpMessage::RouterAdvertisement(ra),
                ..
            } => Some((*src, *dst, *link_dst, ra.clone())),
            _ => None,
        })
        .collect()
}

/// Learn `src` as a neighbor by having it solicit our link-local address
fn solicit_from(h: &Harness, src: Ipv6Addr, mac: MacAddr) {
    let ours = h.link_local();
    h.receive(
        src,
        solicited_node(&ours),
        NdpMessage::NeighborSolicitation(NeighborSolicitation::new(ours, Some(mac))),
    );
}

fn forwarded_packet(src: &str, dst: &str, len: usize) -> Vec<u8> {
    let mut packet = vec![0x60, 0, 0, 0, 0, 0, 59, 64];
    packet.extend_from_slice(&addr(src).octets());
    packet.extend_from_slice(&addr(dst).octets());
    packet.resize(len, 0x5a);
    packet
}

/// Three quick initial advertisements, then the configured interval
#[test]
fn test_unsolicited_advertisements() {
    let settings = RouterAdvSettings::default()
        .with_prefix(AdvertisedPrefix::new(addr("2001:db8:1::"), 64))
        .with_mtu(1500);
    let h = make_router(settings);

    h.advance(48_200);
    let sent = advertisements(&h.link.take());
    assert_eq!(sent.len(), 4);
    for (src, dst, link_dst, ra) in &sent {
        assert_eq!(*src, h.link_local());
        assert_eq!(*dst, ALL_NODES);
        assert_eq!(*link_dst, MacAddr::ipv6_multicast(&ALL_NODES));
        assert_eq!(ra.source_link_addr, Some(OUR_MAC));
        assert_eq!(ra.router_lifetime, 1800);
        assert_eq!(ra.mtu, Some(1500));
        assert_eq!(ra.prefixes[0].prefix, addr("2001:db8:1::"));
    }

    h.advance(100_000);
    assert!(advertisements(&h.link.take()).is_empty());
    assert_eq!(h.stack.metrics().ra_sent.get(), 4);
}

/// A solicitation brings the next advertisement forward and marks the
/// sender as a host
#[test]
fn test_solicitation_answered() {
    let h = make_router(RouterAdvSettings::default());
    h.advance(200);
    assert_eq!(advertisements(&h.link.take()).len(), 1);

    let host = addr("fe80::2");
    h.receive(
        host,
        ALL_ROUTERS,
        NdpMessage::RouterSolicitation(RouterSolicitation::new(Some(PEER_MAC))),
    );
    let (state, is_router) = h
        .stack
        .with_interface(IFACE, |ctx| {
            let entry = ctx.neighbors().find(&host).unwrap();
            (entry.state, entry.is_router)
        })
        .unwrap();
    assert_eq!(state, NeighborState::Stale);
    assert!(!is_router);

    h.advance(3_600);
    assert_eq!(advertisements(&h.link.take()).len(), 1);
    assert_eq!(h.stack.metrics().rs_received.get(), 1);
}

/// Hosts ignore solicitations
#[test]
fn test_host_ignores_solicitation() {
    let h = Harness::new(make_settings());
    h.receive(
        addr("fe80::2"),
        ALL_ROUTERS,
        NdpMessage::RouterSolicitation(RouterSolicitation::new(Some(PEER_MAC))),
    );
    h.advance(20_000);
    assert!(advertisements(&h.link.take()).is_empty());
}

/// Leaving router mode withdraws the router
#[test]
fn test_stop_advertising() {
    let settings = RouterAdvSettings {
        preference: RouterPreference::High,
        cur_hop_limit: 100,
        ..Default::default()
    };
    let h = make_router(settings);
    h.advance(200);
    let sent = advertisements(&h.link.take());
    assert_eq!(sent[0].3.preference, RouterPreference::High);
    assert_eq!(h.stack.with_interface(IFACE, |ctx| ctx.cur_hop_limit()).unwrap(), 100);

    h.stack.stop_router_advertisements(IFACE).unwrap();
    let sent = advertisements(&h.link.take());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].3.router_lifetime, 0);
    assert_eq!(sent[0].3.preference, RouterPreference::Medium);
    assert_eq!(h.stack.with_interface(IFACE, |ctx| ctx.cur_hop_limit()).unwrap(), 64);

    let err = h.stack.stop_router_advertisements(IFACE).unwrap_err();
    assert!(matches!(err, Error::NotFound));

    h.advance(60_000);
    assert!(advertisements(&h.link.take()).is_empty());
}

/// Neighbor Advertisements from a router carry the router flag
#[test]
fn test_router_flag_in_advertisements() {
    let h = make_router(RouterAdvSettings::default());
    solicit_from(&h, addr("fe80::2"), PEER_MAC);

    let flags: Vec<bool> = Harness::ndp_messages(&h.link.take())
        .into_iter()
        .filter_map(|m| match m {
            NdpMessage::NeighborAdvertisement(na) => Some(na.router_flag),
            _ => None,
        })
        .collect();
    assert_eq!(flags, vec![true]);
}

/// A Redirect names the better first hop and echoes the packet
#[test]
fn test_send_redirect() {
    let h = make_router(RouterAdvSettings::default());
    solicit_from(&h, addr("fe80::2"), PEER_MAC);
    solicit_from(&h, addr("fe80::3"), ROUTER_MAC);
    h.link.take();

    let packet = forwarded_packet("fe80::2", "2001:db8:5::1", 100);
    h.stack
        .send_redirect(IFACE, &addr("fe80::3"), &packet)
        .unwrap();

    match h.link.take().as_slice() {
        [Sent::Ndp {
            src,
            dst,
            link_dst,
            message: NdpMessage::Redirect(redirect),
            ..
        }] => {
            assert_eq!(*src, h.link_local());
            assert_eq!(*dst, addr("fe80::2"));
            assert_eq!(*link_dst, PEER_MAC);
            assert_eq!(redirect.target_addr, addr("fe80::3"));
            assert_eq!(redirect.dest_addr, addr("2001:db8:5::1"));
            assert_eq!(redirect.target_link_addr, Some(ROUTER_MAC));
            let header = redirect.redirected_header.as_ref().unwrap();
            assert_eq!(&header[..packet.len()], &packet[..]);
        }
        other => panic!("unexpected transmissions {:?}", other),
    }
    assert_eq!(h.stack.metrics().redirect_sent.get(), 1);
}

/// An oversized packet is cut so the Redirect fits the minimum MTU
#[test]
fn test_send_redirect_truncated() {
    let h = make_router(RouterAdvSettings::default());
    solicit_from(&h, addr("fe80::2"), PEER_MAC);
    solicit_from(&h, addr("fe80::3"), ROUTER_MAC);
    h.link.take();

    let packet = forwarded_packet("fe80::2", "2001:db8:5::1", 1500);
    h.stack
        .send_redirect(IFACE, &addr("fe80::3"), &packet)
        .unwrap();

    let sent = h.link.take();
    let messages = Harness::ndp_messages(&sent);
    assert_eq!(messages.len(), 1);
    assert_eq!(HEADER_LEN + messages[0].to_bytes().len(), MIN_MTU as usize);
    let NdpMessage::Redirect(redirect) = messages[0] else {
        panic!("expected a Redirect, got {:?}", messages[0]);
    };
    let header = redirect.redirected_header.as_ref().unwrap();
    assert_eq!(&header[..], &packet[..header.len()]);
}

/// Redirects need router mode and a reachable on-link source
#[test]
fn test_send_redirect_rejected() {
    let packet = forwarded_packet("fe80::2", "2001:db8:5::1", 100);

    let host = Harness::new(make_settings());
    solicit_from(&host, addr("fe80::2"), PEER_MAC);
    let err = host
        .stack
        .send_redirect(IFACE, &addr("fe80::3"), &packet)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));

    let h = make_router(RouterAdvSettings::default());
    let err = h
        .stack
        .send_redirect(IFACE, &addr("fe80::3"), &packet)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)), "unknown source");

    solicit_from(&h, addr("fe80::2"), PEER_MAC);
    let err = h
        .stack
        .send_redirect(IFACE, &addr("fe80::3"), &packet[..20])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)), "truncated header");

    h.link.take();
    let err = h
        .stack
        .send_redirect(IFACE, &addr("2001:db8:7::1"), &packet)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)), "global target");
    assert!(h.link.take().is_empty());
}

/// `[interfaces.<name>.router_adv]` starts router mode at build time
#[test]
fn test_router_from_config() {
    const CONFIG: &str = r#"
        [ndp]
        rng_seed = 3
        dup_addr_detect_transmits = 0

        [interfaces.lan]
        id = 1
        mac = "02:00:00:00:00:01"

        [interfaces.lan.router_adv]
        min_interval_ms = 10000
        max_interval_ms = 30000
        router_lifetime = 600
        preference = "high"
        prefixes = [{ prefix = "2001:db8:1::/64", autonomous = false }]
        dns_servers = ["2001:db8:1::53"]
        dns_lifetime = 600
    "#;

    let config = config::from_str(CONFIG).unwrap();
    assert!(!config::validate(&config).has_errors());

    let link = Arc::new(RecordingLink::default());
    let stack = NdpStack::from_config(&config, link.clone()).unwrap();
    assert!(stack.with_interface(1, |ctx| ctx.is_router()).unwrap());

    stack.tick();
    let sent = link.take();
    assert_eq!(sent.len(), 1, "router mode sends no solicitations");
    let ras = advertisements(&sent);
    let ra = &ras[0].3;
    assert_eq!(ra.router_lifetime, 600);
    assert_eq!(ra.preference, RouterPreference::High);
    assert!(!ra.prefixes[0].autonomous_flag);
    assert_eq!(ra.rdnss[0].servers, vec![addr("2001:db8:1::53")]);
}
