//! Duplicate Address Detection and address lifetimes

use crate::harness::{addr, make_settings, Harness, Sent, IFACE, OUR_MAC, PEER_MAC};
use ndisc::ndp::{AddressState, Lifetimes, NdpEvent};
use ndisc::protocol::icmpv6::{NdpMessage, NeighborAdvertisement, NeighborSolicitation};
use ndisc::protocol::ipv6::{solicited_node, ALL_NODES};
use ndisc::protocol::MacAddr;
use ndisc::Error;
use std::net::Ipv6Addr;

/// Harness with one DAD probe per address; the link-local address has
/// already completed DAD
fn make_dad_harness() -> Harness {
    let mut settings = make_settings();
    settings.dup_addr_detect_transmits = 1;
    let h = Harness::new(settings);
    h.advance(2_400);
    h.link.take();
    h.take_events();
    h
}

fn address_state(h: &Harness, a: &Ipv6Addr) -> Option<AddressState> {
    h.stack
        .with_interface(IFACE, |ctx| ctx.addresses().find(a).map(|e| e.state))
        .unwrap()
}

fn has_advertisement(sent: &[Sent]) -> bool {
    Harness::ndp_messages(sent)
        .iter()
        .any(|m| matches!(m, NdpMessage::NeighborAdvertisement(_)))
}

/// A new address probes once from :: and becomes Preferred
#[test]
fn test_dad_success() {
    let h = make_dad_harness();
    let global = addr("2001:db8::1");
    assert_eq!(address_state(&h, &h.link_local()), Some(AddressState::Preferred));

    let state = h.stack.add_address(IFACE, global, None, false).unwrap();
    assert_eq!(state, AddressState::Tentative);

    h.advance(2_400);

    let sent = h.link.take();
    assert_eq!(
        sent,
        vec![Sent::Ndp {
            interface: IFACE,
            src: Ipv6Addr::UNSPECIFIED,
            dst: solicited_node(&global),
            link_dst: MacAddr::ipv6_multicast(&solicited_node(&global)),
            message: NdpMessage::NeighborSolicitation(NeighborSolicitation::new(global, None)),
        }]
    );
    assert_eq!(address_state(&h, &global), Some(AddressState::Preferred));

    let events = h.take_events();
    assert_eq!(
        events,
        vec![
            NdpEvent::AddressStateChanged {
                interface: IFACE,
                addr: global,
                state: AddressState::Tentative,
            },
            NdpEvent::AddressStateChanged {
                interface: IFACE,
                addr: global,
                state: AddressState::Preferred,
            },
        ]
    );
}

/// A tentative address is never advertised and loses to a concurrent probe
#[test]
fn test_tentative_address_exclusive() {
    let h = make_dad_harness();
    let global = addr("2001:db8::1");
    h.stack.add_address(IFACE, global, None, false).unwrap();
    h.take_events();

    // Regular NS for a tentative target is not answered
    h.receive(
        addr("fe80::2"),
        solicited_node(&global),
        NdpMessage::NeighborSolicitation(NeighborSolicitation::new(global, Some(PEER_MAC))),
    );
    assert!(!has_advertisement(&h.link.take()));
    assert_eq!(address_state(&h, &global), Some(AddressState::Tentative));

    // Another node running DAD for the same address
    h.receive(
        Ipv6Addr::UNSPECIFIED,
        solicited_node(&global),
        NdpMessage::NeighborSolicitation(NeighborSolicitation::new(global, None)),
    );
    assert_eq!(address_state(&h, &global), Some(AddressState::Invalid));
    assert_eq!(
        h.take_events(),
        vec![
            NdpEvent::DuplicateAddressDetected {
                interface: IFACE,
                addr: global,
            },
            NdpEvent::AddressStateChanged {
                interface: IFACE,
                addr: global,
                state: AddressState::Invalid,
            },
        ]
    );
    assert_eq!(h.stack.metrics().dad_conflicts.get(), 1);

    h.advance(2_400);
    let sent = h.link.take();
    assert!(sent.is_empty(), "duplicate address is neither probed nor advertised: {:?}", sent);
}

/// An NA for a tentative learned address removes it
#[test]
fn test_advertisement_for_tentative_address() {
    let h = make_dad_harness();
    let global = addr("2001:db8::1");
    let lifetimes = Lifetimes {
        valid: 3600,
        preferred: 1800,
    };
    h.stack
        .add_address(IFACE, global, Some(lifetimes), false)
        .unwrap();

    h.receive(
        addr("fe80::2"),
        ALL_NODES,
        NdpMessage::NeighborAdvertisement(NeighborAdvertisement::new(
            global,
            Some(PEER_MAC),
            false,
            false,
            true,
        )),
    );

    assert_eq!(address_state(&h, &global), None, "learned duplicate is dropped");
}

/// A DAD probe for an address we own is answered on all-nodes
#[test]
fn test_defend_address() {
    let h = make_dad_harness();
    let ours = h.link_local();

    h.receive(
        Ipv6Addr::UNSPECIFIED,
        solicited_node(&ours),
        NdpMessage::NeighborSolicitation(NeighborSolicitation::new(ours, None)),
    );

    assert_eq!(
        h.link.take(),
        vec![Sent::Ndp {
            interface: IFACE,
            src: ours,
            dst: ALL_NODES,
            link_dst: MacAddr::ipv6_multicast(&ALL_NODES),
            message: NdpMessage::NeighborAdvertisement(NeighborAdvertisement::new(
                ours,
                Some(OUR_MAC),
                false,
                false,
                true
            )),
        }]
    );
    assert_eq!(address_state(&h, &ours), Some(AddressState::Preferred));
}

/// A configured address found duplicate stays Invalid across link cycles
#[test]
fn test_duplicate_survives_link_cycle() {
    let h = make_dad_harness();
    let global = addr("2001:db8::1");
    h.stack.add_address(IFACE, global, None, false).unwrap();
    h.receive(
        Ipv6Addr::UNSPECIFIED,
        solicited_node(&global),
        NdpMessage::NeighborSolicitation(NeighborSolicitation::new(global, None)),
    );

    h.stack.link_down(IFACE).unwrap();
    h.stack.link_up(IFACE).unwrap();
    h.advance(2_400);

    assert_eq!(address_state(&h, &global), Some(AddressState::Invalid));
    assert_eq!(address_state(&h, &h.link_local()), Some(AddressState::Preferred));

    let probes: Vec<Ipv6Addr> = Harness::ndp_messages(&h.link.take())
        .into_iter()
        .filter_map(|m| match m {
            NdpMessage::NeighborSolicitation(ns) => Some(ns.target_addr),
            _ => None,
        })
        .collect();
    assert_eq!(probes, vec![h.link_local()], "only the link-local address reprobed");
}

/// Learned addresses deprecate and then expire
#[test]
fn test_address_lifetimes() {
    let h = Harness::new(make_settings());
    let global = addr("2001:db8::7");
    let lifetimes = Lifetimes {
        valid: 20,
        preferred: 10,
    };

    let state = h
        .stack
        .add_address(IFACE, global, Some(lifetimes), false)
        .unwrap();
    assert_eq!(state, AddressState::Preferred, "DAD disabled");

    h.advance(10_000);
    assert_eq!(address_state(&h, &global), Some(AddressState::Deprecated));

    h.advance(10_000);
    assert_eq!(address_state(&h, &global), None);

    let states: Vec<AddressState> = h
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            NdpEvent::AddressStateChanged { addr, state, .. } if addr == global => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            AddressState::Preferred,
            AddressState::Deprecated,
            AddressState::Invalid,
        ]
    );
}

/// Removing an unknown address is reported
#[test]
fn test_remove_address() {
    let h = Harness::new(make_settings());
    let global = addr("2001:db8::1");
    h.stack.add_address(IFACE, global, None, false).unwrap();

    h.stack.remove_address(IFACE, &global).unwrap();
    assert_eq!(address_state(&h, &global), None);

    let err = h.stack.remove_address(IFACE, &global).unwrap_err();
    assert!(matches!(err, Error::NotFound));
}
