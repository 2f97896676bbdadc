//! Building a stack from configuration

use crate::harness::{addr, RecordingLink, Sent};
use ndisc::config::{self, validate};
use ndisc::ndp::{AddressState, NdpStack, Resolution};
use ndisc::protocol::icmpv6::NdpMessage;
use ndisc::protocol::ndp_option::RouterPreference;
use ndisc::protocol::MacAddr;
use ndisc::telemetry::init_logging;
use std::sync::Arc;

const CONFIG: &str = r#"
    [ndp]
    rng_seed = 42
    dup_addr_detect_transmits = 0
    router_solicitations = false

    [log]
    level = "warn"

    [interfaces.eth0]
    id = 1
    mac = "02:00:00:00:00:01"
    addresses = ["2001:db8::1"]
    prefixes = ["2001:db8::/64"]
    routers = [{ address = "fe80::1", preference = "high" }]

    [interfaces.eth1]
    id = 2
    mac = "02:00:00:00:00:02"
    mtu = 1280
    up = false
"#;

fn make_stack() -> (NdpStack, Arc<RecordingLink>) {
    let config = config::from_str(CONFIG).unwrap();
    let link = Arc::new(RecordingLink::default());
    let stack = NdpStack::from_config(&config, link.clone()).unwrap();
    (stack, link)
}

/// The sample configuration passes validation
#[test]
fn test_config_validates() {
    let config = config::from_str(CONFIG).unwrap();
    let result = validate(&config);
    assert!(!result.has_errors(), "unexpected errors: {:?}", result.errors);

    init_logging(Some(&config.log));
}

/// Every configured table entry is installed
#[test]
fn test_from_config() {
    let (stack, _link) = make_stack();

    let (states, prefixes, routers, up) = stack
        .with_interface(1, |ctx| {
            (
                ctx.addresses()
                    .iter()
                    .map(|e| (e.addr, e.state))
                    .collect::<Vec<_>>(),
                ctx.prefixes().len(),
                ctx.routers()
                    .iter()
                    .map(|r| (r.addr, r.preference, r.permanent))
                    .collect::<Vec<_>>(),
                ctx.is_link_up(),
            )
        })
        .unwrap();

    let link_local = MacAddr([2, 0, 0, 0, 0, 1]).link_local();
    assert!(up);
    assert!(states.contains(&(link_local, AddressState::Preferred)));
    assert!(states.contains(&(addr("2001:db8::1"), AddressState::Preferred)));
    assert_eq!(prefixes, 1);
    assert_eq!(routers, vec![(addr("fe80::1"), RouterPreference::High, true)]);

    let (up, mtu) = stack
        .with_interface(2, |ctx| (ctx.is_link_up(), ctx.mtu()))
        .unwrap();
    assert!(!up, "eth1 configured down");
    assert_eq!(mtu, 1280);
}

/// Configured prefixes and routers drive next-hop selection
#[test]
fn test_from_config_next_hop() {
    let (stack, link) = make_stack();

    let on_link = addr("2001:db8::99");
    assert_eq!(stack.resolve(1, &on_link).unwrap(), Resolution::InProgress);

    let remote = addr("2001:db8:ff::1");
    assert_eq!(stack.resolve(1, &remote).unwrap(), Resolution::InProgress);

    let targets: Vec<_> = link
        .take()
        .into_iter()
        .filter_map(|s| match s {
            Sent::Ndp { message, .. } => match message {
                NdpMessage::NeighborSolicitation(ns) => Some(ns.target_addr),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![on_link, addr("fe80::1")]);

    // Down interfaces fail resolution without sending anything
    assert_eq!(stack.resolve(2, &on_link).unwrap(), Resolution::Failed);
    assert!(link.take().is_empty());
}

/// Each interface keeps its own clock
#[test]
fn test_tick_all_interfaces() {
    let (stack, _link) = make_stack();
    for _ in 0..5 {
        stack.tick();
    }
    let clocks: Vec<u64> = [1, 2]
        .iter()
        .map(|id| stack.with_interface(*id, |ctx| ctx.now()).unwrap())
        .collect();
    assert_eq!(clocks, vec![1_000, 1_000]);

    stack.remove_interface(2).unwrap();
    assert!(stack.with_interface(2, |ctx| ctx.now()).is_err());
}
