//! Neighbor Discovery engine (RFC 4861 / RFC 4862)
//!
//! Each interface owns an [`InterfaceNdpContext`] with five fixed-capacity
//! tables (neighbors, destinations, addresses, prefixes, default routers).
//! Processing never performs I/O: every operation pushes [`NdpAction`]s that
//! the [`NdpStack`] façade executes once its lock is released.
//!
//! Time is counted in milliseconds on a per-interface virtual clock that
//! only moves when [`NdpStack::tick`] runs.

pub mod address_list;
pub mod destination_cache;
pub mod driver;
pub mod interface;
pub mod neighbor_cache;
pub mod prefix_list;
pub mod processor;
pub mod router_advertiser;
pub mod router_discovery;
pub mod router_list;
pub mod stack;

pub use address_list::{AddressEntry, AddressList, AddressState, Lifetimes};
pub use destination_cache::{DestinationCache, DestinationEntry};
pub use interface::{InterfaceNdpContext, Resolution};
pub use neighbor_cache::{NeighborCache, NeighborEntry, NeighborState, PacketOrigin, QueuedPacket};
pub use prefix_list::{PrefixEntry, PrefixList};
pub use processor::PseudoHeader;
pub use router_advertiser::{AdvertisedPrefix, RouterAdvSettings, RouterAdvertiser};
pub use router_discovery::{RouterSolicitor, SolicitState};
pub use router_list::{RouterEntry, RouterList};
pub use stack::{LinkLayer, NdpStack};

use crate::protocol::icmpv6::NdpMessage;
use crate::protocol::ndp_option::{PrefixInformation, SixlowpanContext};
use crate::protocol::MacAddr;
use std::net::Ipv6Addr;

/// Interface index as known to the embedding stack
pub type InterfaceId = u32;

/// Milliseconds on the interface clock
pub type Millis = u64;

/// Multicast NS sent before an Incomplete entry is given up
pub const MAX_MULTICAST_SOLICIT: u8 = 3;
/// Unicast NS sent from Probe before the neighbor is declared unreachable
pub const MAX_UNICAST_SOLICIT: u8 = 3;
/// Base ReachableTime (ms)
pub const REACHABLE_TIME: u32 = 30_000;
/// RetransTimer (ms)
pub const RETRANS_TIMER: u32 = 1_000;
/// Delay state duration (ms)
pub const DELAY_FIRST_PROBE_TIME: u32 = 5_000;
/// Upper bound of the random delay before the first RS or DAD probe (ms)
pub const MAX_RTR_SOLICITATION_DELAY: u32 = 1_000;
/// Spacing between Router Solicitations (ms)
pub const RTR_SOLICITATION_INTERVAL: u32 = 4_000;
pub const MAX_RTR_SOLICITATIONS: u8 = 3;
/// Every NDP message is sent and accepted with this hop limit
pub const NDP_HOP_LIMIT: u8 = 255;
/// Default Cur Hop Limit until an RA says otherwise
pub const DEFAULT_HOP_LIMIT: u8 = 64;
/// Default period of the tick driver (ms)
pub const TICK_INTERVAL: u32 = 200;

pub const NUM_NEIGHBORS: usize = 10;
pub const NUM_DESTINATIONS: usize = 10;
pub const NUM_PREFIXES: usize = 5;
pub const NUM_ROUTERS: usize = 3;
pub const NUM_ADDRESSES: usize = 3;
pub const NEIGHBOR_QUEUE_LEN: usize = 3;

/// Lifetime ceiling in ms; entries at this value never age
pub const LIFETIME_INFINITE: u32 = u32::MAX;

/// Convert a wire lifetime in seconds to ms, saturating at the ceiling
pub fn lifetime_ms(secs: u32) -> u32 {
    secs.saturating_mul(1000)
}

/// Remaining lifetime after `elapsed` ms; the ceiling is never decremented
pub(crate) fn age_lifetime(remaining: u32, elapsed: u32) -> u32 {
    if remaining == LIFETIME_INFINITE {
        remaining
    } else {
        remaining.saturating_sub(elapsed)
    }
}

/// Work produced under the stack lock and executed after it is released
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdpAction {
    /// Transmit an NDP message (hop limit 255)
    SendNdp {
        interface: InterfaceId,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        link_dst: MacAddr,
        message: NdpMessage,
    },
    /// Transmit an IPv6 packet that was waiting for address resolution
    Transmit {
        interface: InterfaceId,
        link_dst: MacAddr,
        packet: Vec<u8>,
    },
    /// A forwarded packet could not be delivered; `interface` is the one it
    /// arrived on (ICMPv6 Destination Unreachable, code 3)
    DestinationUnreachable {
        interface: InterfaceId,
        packet: Vec<u8>,
    },
    /// Notification for the registered event callback
    Event(NdpEvent),
}

/// Notifications delivered outside the lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdpEvent {
    AddressStateChanged {
        interface: InterfaceId,
        addr: Ipv6Addr,
        state: AddressState,
    },
    DuplicateAddressDetected {
        interface: InterfaceId,
        addr: Ipv6Addr,
    },
    /// Prefix with the autonomous flag, for address autoconfiguration
    AutoconfPrefix {
        interface: InterfaceId,
        prefix: PrefixInformation,
    },
    /// RA M/O flags, for a DHCPv6 client
    ManagedConfig {
        interface: InterfaceId,
        managed: bool,
        other: bool,
    },
    DnsServers {
        interface: InterfaceId,
        servers: Vec<Ipv6Addr>,
        lifetime: u32,
    },
    SixlowpanContext {
        interface: InterfaceId,
        context: SixlowpanContext,
    },
    MtuChanged {
        interface: InterfaceId,
        mtu: u32,
    },
}
