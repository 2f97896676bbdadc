//! Per-interface Neighbor Discovery state
//!
//! [`InterfaceNdpContext`] owns the five tables of one interface together
//! with its link parameters and clock. Everything here runs under the
//! stack lock and reports its side effects as [`NdpAction`]s.

use super::address_list::AddressTimerEvent;
use super::neighbor_cache::{NeighborTimerEvent, ResolveStep};
use super::{
    AddressList, AddressState, DestinationCache, InterfaceId, Lifetimes, Millis, NdpAction,
    NdpEvent, NeighborCache, NeighborEntry, NeighborState, PacketOrigin, PrefixEntry, PrefixList,
    QueuedPacket, RouterAdvSettings, RouterAdvertiser, RouterEntry, RouterList, RouterSolicitor,
    SolicitState, LIFETIME_INFINITE, MAX_RTR_SOLICITATION_DELAY,
};
use crate::config::NdpSettings;
use crate::protocol::icmpv6::{
    NdpMessage, NeighborAdvertisement, NeighborSolicitation, Redirect, RouterSolicitation,
};
use crate::protocol::ipv6::{
    header_addrs, is_link_local, solicited_node, ALL_NODES, ALL_ROUTERS, HEADER_LEN, MIN_MTU,
};
use crate::protocol::ndp_option::{RouterPreference, OPTION_UNIT};
use crate::protocol::MacAddr;
use crate::telemetry::NdpMetrics;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv6Addr;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Answer to an address resolution request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Link-layer address of the next hop
    Address(MacAddr),
    /// Neighbor Solicitation outstanding; queue the packet
    InProgress,
    /// The link is down
    Failed,
}

#[derive(Debug)]
pub struct InterfaceNdpContext {
    pub(crate) id: InterfaceId,
    pub(crate) name: String,
    pub(crate) mac: MacAddr,
    /// Physical MTU
    pub(crate) link_mtu: u32,
    /// Current MTU, lowered by RA MTU options
    pub(crate) mtu: u32,
    pub(crate) cur_hop_limit: u8,
    pub(crate) base_reachable_time: u32,
    /// Randomized from base_reachable_time (RFC 4861 §6.3.2)
    pub(crate) reachable_time: u32,
    pub(crate) retrans_timer: u32,
    pub(crate) dup_addr_detect_transmits: u8,
    pub(crate) link_up: bool,
    pub(crate) now: Millis,
    pub(crate) neighbors: NeighborCache,
    pub(crate) destinations: DestinationCache,
    pub(crate) addresses: AddressList,
    pub(crate) prefixes: PrefixList,
    pub(crate) routers: RouterList,
    pub(crate) solicitor: RouterSolicitor,
    /// Present while the interface acts as a router
    pub(crate) advertiser: Option<RouterAdvertiser>,
    /// Last reported RA M/O flags
    pub(crate) managed_config: Option<(bool, bool)>,
    pub(crate) metrics: Arc<NdpMetrics>,
    settings: NdpSettings,
    rng: StdRng,
}

impl InterfaceNdpContext {
    /// New interface context; the link starts down
    pub fn new(
        id: InterfaceId,
        name: &str,
        mac: MacAddr,
        link_mtu: u32,
        settings: &NdpSettings,
        metrics: Arc<NdpMetrics>,
    ) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ u64::from(id)),
            None => StdRng::from_entropy(),
        };

        let mut ctx = Self {
            id,
            name: name.to_string(),
            mac,
            link_mtu,
            mtu: link_mtu,
            cur_hop_limit: settings.cur_hop_limit,
            base_reachable_time: settings.reachable_time_ms,
            reachable_time: settings.reachable_time_ms,
            retrans_timer: settings.retrans_timer_ms,
            dup_addr_detect_transmits: settings.dup_addr_detect_transmits,
            link_up: false,
            now: 0,
            neighbors: NeighborCache::new(
                settings.neighbor_cache_size,
                settings.neighbor_queue_len,
            ),
            destinations: DestinationCache::new(settings.destination_cache_size),
            addresses: AddressList::new(settings.address_list_size),
            prefixes: PrefixList::new(settings.prefix_list_size),
            routers: RouterList::new(settings.router_list_size),
            solicitor: RouterSolicitor::new(settings.max_router_solicitations),
            advertiser: None,
            managed_config: None,
            metrics,
            settings: settings.clone(),
            rng,
        };
        ctx.randomize_reachable_time();
        ctx
    }

    pub fn id(&self) -> InterfaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    pub fn link_mtu(&self) -> u32 {
        self.link_mtu
    }

    pub fn cur_hop_limit(&self) -> u8 {
        self.cur_hop_limit
    }

    pub fn reachable_time(&self) -> u32 {
        self.reachable_time
    }

    pub fn base_reachable_time(&self) -> u32 {
        self.base_reachable_time
    }

    pub fn retrans_timer(&self) -> u32 {
        self.retrans_timer
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    /// Interface clock (ms)
    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn neighbors(&self) -> &NeighborCache {
        &self.neighbors
    }

    pub fn destinations(&self) -> &DestinationCache {
        &self.destinations
    }

    pub fn addresses(&self) -> &AddressList {
        &self.addresses
    }

    pub fn prefixes(&self) -> &PrefixList {
        &self.prefixes
    }

    pub fn routers(&self) -> &RouterList {
        &self.routers
    }

    pub fn solicitor(&self) -> &RouterSolicitor {
        &self.solicitor
    }

    pub fn advertiser(&self) -> Option<&RouterAdvertiser> {
        self.advertiser.as_ref()
    }

    /// Whether the interface sends Router Advertisements
    pub fn is_router(&self) -> bool {
        self.advertiser.is_some()
    }

    fn random_delay(&mut self) -> u32 {
        self.rng.gen_range(0..=MAX_RTR_SOLICITATION_DELAY)
    }

    /// Pick ReachableTime uniformly in [0.5, 1.5] x base
    pub(crate) fn randomize_reachable_time(&mut self) {
        let base = u64::from(self.base_reachable_time);
        let picked = self.rng.gen_range(base / 2..=base * 3 / 2);
        self.reachable_time = u32::try_from(picked).unwrap_or(u32::MAX);
    }

    // ===== Address resolution =====

    /// Next hop for `dest`, through the Destination Cache
    fn next_hop(&mut self, dest: &Ipv6Addr) -> Result<Ipv6Addr> {
        let (prefixes, routers, neighbors) = (&self.prefixes, &self.routers, &self.neighbors);
        let mtu = self.mtu;
        let entry = self.destinations.find_or_create(*dest, self.now, || {
            determine_next_hop(prefixes, routers, neighbors, dest, None)
                .map(|next_hop| (next_hop, mtu))
        })?;
        Ok(entry.next_hop)
    }

    /// Move destinations off a next hop that stopped answering
    ///
    /// Off-link destinations go to the next default router in round-robin
    /// order; those left without a route are dropped.
    fn reroute(&mut self, unreachable: &Ipv6Addr) -> usize {
        let (prefixes, routers, neighbors) = (&self.prefixes, &self.routers, &self.neighbors);
        self.destinations.reroute(unreachable, |dest| {
            determine_next_hop(prefixes, routers, neighbors, dest, Some(unreachable))
        })
    }

    fn lookup(
        &mut self,
        dest: &Ipv6Addr,
        actions: &mut Vec<NdpAction>,
    ) -> Result<(Ipv6Addr, ResolveStep)> {
        if dest.is_unspecified() {
            return Err(Error::InvalidParameter(
                "cannot resolve the unspecified address".into(),
            ));
        }
        let next_hop = self.next_hop(dest)?;
        let step = self
            .neighbors
            .resolve(next_hop, self.now, self.retrans_timer)?;

        if let ResolveStep::Started { evicted } = &step {
            if evicted.is_some() {
                self.metrics.neighbor_evictions.inc();
            }
            self.send_multicast_ns(&next_hop, actions);
        }
        Ok((next_hop, step))
    }

    /// Resolve the link-layer address used to reach `dest`
    pub fn resolve(
        &mut self,
        dest: &Ipv6Addr,
        actions: &mut Vec<NdpAction>,
    ) -> Result<Resolution> {
        if !self.link_up {
            return Ok(Resolution::Failed);
        }
        if dest.is_multicast() {
            return Ok(Resolution::Address(MacAddr::ipv6_multicast(dest)));
        }

        match self.lookup(dest, actions)? {
            (_, ResolveStep::Resolved(mac)) => Ok(Resolution::Address(mac)),
            (_, ResolveStep::Started { evicted }) => {
                if let Some(old) = evicted {
                    self.discard_entry(old, actions);
                }
                Ok(Resolution::InProgress)
            }
            (_, ResolveStep::Pending) => Ok(Resolution::InProgress),
        }
    }

    /// Send `packet` to `dest`, holding it while the next hop resolves
    ///
    /// A packet that cannot be sent is dropped; forwarded packets are
    /// reported back as Destination Unreachable.
    pub fn enqueue(
        &mut self,
        dest: &Ipv6Addr,
        packet: QueuedPacket,
        actions: &mut Vec<NdpAction>,
    ) -> Result<()> {
        if !self.link_up {
            debug!(interface = %self.name, dest = %dest, "Link down, packet dropped");
            self.discard_packet(packet, actions);
            return Ok(());
        }
        if dest.is_multicast() {
            actions.push(NdpAction::Transmit {
                interface: self.id,
                link_dst: MacAddr::ipv6_multicast(dest),
                packet: packet.data,
            });
            return Ok(());
        }

        let (next_hop, step) = match self.lookup(dest, actions) {
            Ok(found) => found,
            Err(e) => {
                debug!(interface = %self.name, dest = %dest, error = %e, "Packet dropped");
                self.discard_packet(packet, actions);
                return Err(e);
            }
        };

        match step {
            ResolveStep::Resolved(mac) => actions.push(NdpAction::Transmit {
                interface: self.id,
                link_dst: mac,
                packet: packet.data,
            }),
            ResolveStep::Started { evicted } => {
                if let Some(old) = evicted {
                    self.discard_entry(old, actions);
                }
                self.queue_packet(&next_hop, packet)?;
            }
            ResolveStep::Pending => self.queue_packet(&next_hop, packet)?,
        }
        Ok(())
    }

    fn queue_packet(&mut self, next_hop: &Ipv6Addr, packet: QueuedPacket) -> Result<()> {
        if let Some(dropped) = self.neighbors.enqueue(next_hop, packet)? {
            self.metrics.queue_drops.inc();
            debug!(
                interface = %self.name,
                neighbor = %next_hop,
                bytes = dropped.data.len(),
                "Pending queue full, oldest packet dropped"
            );
        }
        Ok(())
    }

    /// Upper-layer confirmation that `addr` is reachable
    pub fn reachability_hint(&mut self, addr: &Ipv6Addr) -> bool {
        self.neighbors
            .confirm_reachability(addr, self.now, self.reachable_time)
    }

    /// Path MTU towards `dest`; the interface MTU when nothing is cached
    pub fn path_mtu(&self, dest: &Ipv6Addr) -> u32 {
        self.destinations
            .find(dest)
            .map_or(self.mtu, |entry| entry.path_mtu)
    }

    /// Apply an ICMPv6 Packet Too Big report
    pub fn update_path_mtu(&mut self, dest: &Ipv6Addr, mtu: u32) -> Result<u32> {
        self.destinations.update_path_mtu(dest, mtu, self.mtu)
    }

    // ===== Neighbor helpers =====

    /// Record a link-layer address carried by NS, RA or Redirect and send
    /// whatever was waiting for it
    pub(crate) fn learn_neighbor(
        &mut self,
        addr: Ipv6Addr,
        mac: MacAddr,
        actions: &mut Vec<NdpAction>,
    ) {
        match self.neighbors.learn(addr, mac, self.now) {
            Ok(learned) => {
                if let Some(old) = learned.evicted {
                    self.metrics.neighbor_evictions.inc();
                    self.discard_entry(old, actions);
                }
                self.transmit_all(learned.flushed, mac, actions);
            }
            Err(e) => {
                trace!(interface = %self.name, neighbor = %addr, error = %e, "Neighbor not learned")
            }
        }
    }

    pub(crate) fn transmit_all(
        &self,
        packets: Vec<QueuedPacket>,
        link_dst: MacAddr,
        actions: &mut Vec<NdpAction>,
    ) {
        for packet in packets {
            actions.push(NdpAction::Transmit {
                interface: self.id,
                link_dst,
                packet: packet.data,
            });
        }
    }

    fn discard_packet(&self, packet: QueuedPacket, actions: &mut Vec<NdpAction>) {
        if let PacketOrigin::Forwarded { ingress } = packet.origin {
            actions.push(NdpAction::DestinationUnreachable {
                interface: ingress,
                packet: packet.data,
            });
        }
    }

    /// Drop a removed neighbor entry and its queue
    fn discard_entry(&self, mut entry: NeighborEntry, actions: &mut Vec<NdpAction>) {
        for packet in entry.take_queue() {
            self.discard_packet(packet, actions);
        }
    }

    /// DAD conflict on `addr`
    pub(crate) fn duplicate_detected(&mut self, addr: &Ipv6Addr, actions: &mut Vec<NdpAction>) {
        if !self.addresses.mark_duplicate(addr) {
            return;
        }
        self.metrics.dad_conflicts.inc();
        actions.push(NdpAction::Event(NdpEvent::DuplicateAddressDetected {
            interface: self.id,
            addr: *addr,
        }));
        actions.push(NdpAction::Event(NdpEvent::AddressStateChanged {
            interface: self.id,
            addr: *addr,
            state: AddressState::Invalid,
        }));
    }

    // ===== Transmission =====

    pub(crate) fn push_ndp(
        &self,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        link_dst: MacAddr,
        message: NdpMessage,
        actions: &mut Vec<NdpAction>,
    ) {
        trace!(
            interface = %self.name,
            msg_type = ?message.msg_type(),
            src = %src,
            dst = %dst,
            "Sending NDP message"
        );
        self.metrics
            .record_tx(&self.name, message.msg_type(), message.to_bytes().len());
        actions.push(NdpAction::SendNdp {
            interface: self.id,
            src,
            dst,
            link_dst,
            message,
        });
    }

    /// Source for a solicitation about `target` and whether to attach SLLAO
    fn solicitation_source(&self, target: &Ipv6Addr) -> (Ipv6Addr, Option<MacAddr>) {
        match self.addresses.select_source(target) {
            Some(src) => (src, Some(self.mac)),
            None => (Ipv6Addr::UNSPECIFIED, None),
        }
    }

    pub(crate) fn send_multicast_ns(&self, target: &Ipv6Addr, actions: &mut Vec<NdpAction>) {
        let (src, sllao) = self.solicitation_source(target);
        let dst = solicited_node(target);
        let ns = NeighborSolicitation::new(*target, sllao);
        self.push_ndp(
            src,
            dst,
            MacAddr::ipv6_multicast(&dst),
            NdpMessage::NeighborSolicitation(ns),
            actions,
        );
    }

    fn send_unicast_ns(
        &self,
        target: &Ipv6Addr,
        link_addr: MacAddr,
        actions: &mut Vec<NdpAction>,
    ) {
        let (src, sllao) = self.solicitation_source(target);
        let ns = NeighborSolicitation::new(*target, sllao);
        self.push_ndp(
            src,
            *target,
            link_addr,
            NdpMessage::NeighborSolicitation(ns),
            actions,
        );
    }

    /// DAD probe: unspecified source, no SLLAO (RFC 4862 §5.4.2)
    fn send_dad_ns(&self, addr: &Ipv6Addr, actions: &mut Vec<NdpAction>) {
        let dst = solicited_node(addr);
        let ns = NeighborSolicitation::new(*addr, None);
        self.push_ndp(
            Ipv6Addr::UNSPECIFIED,
            dst,
            MacAddr::ipv6_multicast(&dst),
            NdpMessage::NeighborSolicitation(ns),
            actions,
        );
    }

    fn send_rs(&self, actions: &mut Vec<NdpAction>) {
        let src = self
            .addresses
            .link_local()
            .filter(|e| e.state.is_valid())
            .map(|e| e.addr);
        let rs = RouterSolicitation::new(src.map(|_| self.mac));
        debug!(
            interface = %self.name,
            sent = self.solicitor.sent(),
            "Sending Router Solicitation"
        );
        self.push_ndp(
            src.unwrap_or(Ipv6Addr::UNSPECIFIED),
            ALL_ROUTERS,
            MacAddr::ipv6_multicast(&ALL_ROUTERS),
            NdpMessage::RouterSolicitation(rs),
            actions,
        );
    }

    pub(crate) fn send_na(
        &self,
        dst: Ipv6Addr,
        link_dst: MacAddr,
        na: NeighborAdvertisement,
        actions: &mut Vec<NdpAction>,
    ) {
        // Answer from the advertised address itself
        let src = na.target_addr;
        self.push_ndp(src, dst, link_dst, NdpMessage::NeighborAdvertisement(na), actions);
    }

    /// Link-local address once DAD has finished
    fn preferred_link_local(&self) -> Option<Ipv6Addr> {
        self.addresses
            .link_local()
            .filter(|e| e.state == AddressState::Preferred)
            .map(|e| e.addr)
    }

    /// Multicast an RA to all-nodes from the link-local address
    fn send_router_advertisement(
        &self,
        settings: &RouterAdvSettings,
        router_lifetime: u16,
        actions: &mut Vec<NdpAction>,
    ) {
        let Some(src) = self.preferred_link_local() else {
            debug!(interface = %self.name, "No usable link-local address, RA not sent");
            return;
        };
        let ra = settings.build(self.mac, router_lifetime);
        debug!(
            interface = %self.name,
            lifetime = router_lifetime,
            prefixes = ra.prefixes.len(),
            "Sending Router Advertisement"
        );
        self.push_ndp(
            src,
            ALL_NODES,
            MacAddr::ipv6_multicast(&ALL_NODES),
            NdpMessage::RouterAdvertisement(ra),
            actions,
        );
    }

    /// Tell the sender of `packet` that `target` is a better first hop for
    /// its destination (RFC 4861 §8.2)
    ///
    /// `packet` is the IPv6 packet being forwarded, header included. The
    /// Redirect goes to the packet's source, which must be an on-link
    /// neighbor with a known link-layer address.
    pub fn send_redirect(
        &self,
        target: &Ipv6Addr,
        packet: &[u8],
        actions: &mut Vec<NdpAction>,
    ) -> Result<()> {
        if !self.is_router() {
            return Err(Error::InvalidParameter(
                "Redirects are only sent in router mode".into(),
            ));
        }
        let (src, dest) = header_addrs(packet).ok_or_else(|| {
            Error::InvalidParameter("redirected packet shorter than an IPv6 header".into())
        })?;
        if dest.is_multicast() {
            return Err(Error::InvalidParameter(format!(
                "cannot redirect multicast destination {}",
                dest
            )));
        }
        if !is_link_local(target) && *target != dest {
            return Err(Error::InvalidParameter(format!(
                "Redirect target {} is neither link-local nor the destination",
                target
            )));
        }
        if !is_link_local(&src) && !self.prefixes.is_on_link(&src) {
            return Err(Error::InvalidParameter(format!("source {} is not on-link", src)));
        }
        let link_dst = self
            .neighbors
            .find(&src)
            .and_then(NeighborEntry::resolved_addr)
            .ok_or_else(|| {
                Error::InvalidParameter(format!("no link-layer address for source {}", src))
            })?;
        let ours = self.preferred_link_local().ok_or_else(|| {
            Error::InvalidParameter("no usable link-local address".into())
        })?;

        let tlla = self.neighbors.find(target).and_then(NeighborEntry::resolved_addr);
        let mut redirect = Redirect::new(*target, dest, tlla);

        // The whole Redirect must fit a minimum-MTU packet
        let room = MIN_MTU as usize - HEADER_LEN - redirect.to_bytes().len() - OPTION_UNIT;
        let room = room - room % OPTION_UNIT;
        redirect.redirected_header = Some(packet[..packet.len().min(room)].to_vec());

        debug!(
            interface = %self.name,
            host = %src,
            dest = %dest,
            target = %target,
            "Sending Redirect"
        );
        self.push_ndp(ours, src, link_dst, NdpMessage::Redirect(redirect), actions);
        Ok(())
    }

    // ===== Timers =====

    /// Advance the interface clock by `elapsed` ms
    pub fn tick(&mut self, elapsed: u32, actions: &mut Vec<NdpAction>) {
        self.now += Millis::from(elapsed);
        if !self.link_up {
            return;
        }

        for event in self.neighbors.tick(elapsed, self.now, self.retrans_timer) {
            match event {
                NeighborTimerEvent::SendMulticastSolicitation(addr) => {
                    self.send_multicast_ns(&addr, actions)
                }
                NeighborTimerEvent::SendUnicastSolicitation { addr, link_addr } => {
                    self.send_unicast_ns(&addr, link_addr, actions)
                }
                NeighborTimerEvent::Unreachable(entry) => {
                    self.metrics.resolution_failures.inc();
                    let dropped = self.reroute(&entry.ip_addr);
                    debug!(
                        interface = %self.name,
                        neighbor = %entry.ip_addr,
                        queued = entry.queue_len(),
                        dropped,
                        "Neighbor unreachable"
                    );
                    self.discard_entry(entry, actions);
                }
            }
        }

        let dad_events = self.addresses.tick(
            elapsed,
            self.retrans_timer,
            self.dup_addr_detect_transmits,
            self.link_up,
        );
        for event in dad_events {
            match event {
                AddressTimerEvent::SendDadSolicitation(addr) => self.send_dad_ns(&addr, actions),
                AddressTimerEvent::StateChanged { addr, state } => {
                    actions.push(NdpAction::Event(NdpEvent::AddressStateChanged {
                        interface: self.id,
                        addr,
                        state,
                    }))
                }
            }
        }

        self.prefixes.tick(elapsed);

        for router in self.routers.tick(elapsed) {
            let flushed = self.destinations.invalidate_next_hop(&router.addr);
            debug!(
                interface = %self.name,
                router = %router.addr,
                flushed,
                "Default router expired"
            );
        }

        let link_local_ready = self.preferred_link_local().is_some();
        let advertise = match self.advertiser.as_mut() {
            Some(advertiser) => link_local_ready && advertiser.poll(self.now, &mut self.rng),
            None => false,
        };
        if let Some(advertiser) = self.advertiser.as_ref() {
            if advertise {
                let settings = advertiser.settings();
                self.send_router_advertisement(settings, settings.router_lifetime, actions);
            }
            return;
        }

        if self.solicitor.tick(elapsed) {
            self.send_rs(actions);
        }
        // Solicit only once the link-local address survived DAD
        if link_local_ready
            && self.settings.router_solicitations
            && self.solicitor.state() == SolicitState::Idle
        {
            // DAD already waited out a random delay
            let delay = if self.dup_addr_detect_transmits > 0 {
                0
            } else {
                self.random_delay()
            };
            self.solicitor.start(delay);
        }
    }

    /// An RS arrived on a router interface
    pub(crate) fn answer_solicitation(&mut self) {
        if let Some(advertiser) = self.advertiser.as_mut() {
            advertiser.solicited(self.now, &mut self.rng);
        }
    }

    // ===== Router mode =====

    /// Switch the interface to router mode (RFC 4861 §6.2.2)
    ///
    /// Router Solicitation stops and the advertised link parameters are
    /// applied to the interface itself. Calling again replaces the
    /// advertised settings.
    pub fn start_advertising(&mut self, settings: RouterAdvSettings) -> Result<()> {
        settings.check()?;
        self.solicitor.reset();
        self.advertiser = Some(RouterAdvertiser::new(settings, self.now));
        self.apply_router_parameters();
        info!(interface = %self.name, "Router Advertisements enabled");
        Ok(())
    }

    /// Leave router mode with a final zero-lifetime RA (RFC 4861 §6.2.5)
    pub fn stop_advertising(&mut self, actions: &mut Vec<NdpAction>) -> Result<()> {
        let advertiser = self.advertiser.take().ok_or(Error::NotFound)?;
        if self.link_up {
            self.send_router_advertisement(advertiser.settings(), 0, actions);
        }

        self.cur_hop_limit = self.settings.cur_hop_limit;
        self.base_reachable_time = self.settings.reachable_time_ms;
        self.retrans_timer = self.settings.retrans_timer_ms;
        self.randomize_reachable_time();
        info!(interface = %self.name, "Router Advertisements disabled");
        Ok(())
    }

    /// Use the advertised non-zero parameters on this interface too
    fn apply_router_parameters(&mut self) {
        let Some(settings) = self.advertiser.as_ref().map(RouterAdvertiser::settings) else {
            return;
        };
        let (hop_limit, reachable, retrans) = (
            settings.cur_hop_limit,
            settings.reachable_time,
            settings.retrans_timer,
        );
        if hop_limit != 0 {
            self.cur_hop_limit = hop_limit;
        }
        if reachable != 0 {
            self.base_reachable_time = reachable;
            self.randomize_reachable_time();
        }
        if retrans != 0 {
            self.retrans_timer = retrans;
        }
    }

    // ===== Link state =====

    /// Start DAD on every address
    ///
    /// Router Solicitation, or advertising in router mode, starts from the
    /// tick once the link-local address is Preferred.
    pub fn link_up(&mut self, actions: &mut Vec<NdpAction>) {
        if self.link_up {
            return;
        }
        self.link_up = true;
        info!(interface = %self.name, "Link up");

        let rng = &mut self.rng;
        self.addresses.restart_dad(
            || rng.gen_range(0..=MAX_RTR_SOLICITATION_DELAY),
            self.dup_addr_detect_transmits,
        );
        for entry in self.addresses.iter().filter(|e| !e.duplicate) {
            actions.push(NdpAction::Event(NdpEvent::AddressStateChanged {
                interface: self.id,
                addr: entry.addr,
                state: entry.state,
            }));
        }

        let now = self.now;
        if let Some(advertiser) = self.advertiser.as_mut() {
            advertiser.restart(now);
        }
        self.apply_router_parameters();
    }

    /// Discard every learned entry and every queued packet
    pub fn link_down(&mut self) {
        if !self.link_up {
            return;
        }
        self.link_up = false;

        let dropped: usize = self
            .neighbors
            .clear()
            .iter()
            .map(NeighborEntry::queue_len)
            .sum();
        self.destinations.flush();
        self.prefixes.flush_dynamic();
        self.routers.flush_dynamic();
        self.addresses.link_down();
        self.solicitor.reset();

        self.mtu = self.link_mtu;
        self.cur_hop_limit = self.settings.cur_hop_limit;
        self.base_reachable_time = self.settings.reachable_time_ms;
        self.retrans_timer = self.settings.retrans_timer_ms;
        self.randomize_reachable_time();
        self.apply_router_parameters();
        self.managed_config = None;

        info!(interface = %self.name, dropped, "Link down");
    }

    // ===== List mutation =====

    /// Assign an address; `None` lifetimes make it permanent
    pub fn add_address(
        &mut self,
        addr: Ipv6Addr,
        lifetimes: Option<Lifetimes>,
        anycast: bool,
        actions: &mut Vec<NdpAction>,
    ) -> Result<AddressState> {
        let known = self.addresses.find(&addr).is_some();
        let delay = self.random_delay();
        let state = self.addresses.add(
            addr,
            lifetimes,
            anycast,
            delay,
            self.dup_addr_detect_transmits,
        )?;
        if !known {
            actions.push(NdpAction::Event(NdpEvent::AddressStateChanged {
                interface: self.id,
                addr,
                state,
            }));
        }
        Ok(state)
    }

    pub fn remove_address(
        &mut self,
        addr: &Ipv6Addr,
        actions: &mut Vec<NdpAction>,
    ) -> Result<()> {
        self.addresses.remove(addr).ok_or(Error::NotFound)?;
        debug!(interface = %self.name, addr = %addr, "Address removed");
        actions.push(NdpAction::Event(NdpEvent::AddressStateChanged {
            interface: self.id,
            addr: *addr,
            state: AddressState::Invalid,
        }));
        Ok(())
    }

    /// Configure a permanent on-link prefix
    pub fn add_prefix(&mut self, prefix: Ipv6Addr, prefix_len: u8) -> Result<()> {
        if prefix_len > 128 {
            return Err(Error::InvalidParameter(format!(
                "prefix length {} exceeds 128",
                prefix_len
            )));
        }
        self.prefixes
            .upsert(PrefixEntry::permanent(prefix, prefix_len))
    }

    pub fn remove_prefix(&mut self, prefix: &Ipv6Addr, prefix_len: u8) -> Result<()> {
        self.prefixes
            .remove(prefix, prefix_len)
            .map(|_| ())
            .ok_or(Error::NotFound)
    }

    /// Configure a permanent default router
    pub fn add_default_router(
        &mut self,
        addr: Ipv6Addr,
        preference: RouterPreference,
    ) -> Result<()> {
        if !is_link_local(&addr) {
            return Err(Error::InvalidParameter(format!(
                "default router {} is not link-local",
                addr
            )));
        }
        let evicted = self.routers.upsert(RouterEntry {
            addr,
            lifetime: LIFETIME_INFINITE,
            preference,
            permanent: true,
        })?;
        if let Some(old) = evicted {
            self.destinations.invalidate_next_hop(&old.addr);
        }
        Ok(())
    }

    pub fn remove_default_router(&mut self, addr: &Ipv6Addr) -> Result<()> {
        self.routers.remove(addr).ok_or(Error::NotFound)?;
        self.destinations.invalidate_next_hop(addr);
        Ok(())
    }

    /// Empty the Neighbor Cache, dropping queued packets
    pub fn flush_neighbors(&mut self) {
        let removed = self.neighbors.clear();
        debug!(interface = %self.name, removed = removed.len(), "Neighbor cache flushed");
    }

    pub fn flush_destinations(&mut self) {
        self.destinations.flush();
    }

    pub fn flush_prefixes(&mut self) {
        self.prefixes.clear();
        self.destinations.flush();
    }

    pub fn flush_routers(&mut self) {
        for router in self.routers.clear() {
            self.destinations.invalidate_next_hop(&router.addr);
        }
    }
}

/// Next-hop determination (RFC 4861 §5.2)
///
/// Link-local and on-link destinations are their own next hop; anything
/// else goes through the best default router. `unreachable` is a router
/// that just failed; the search starts after it and never counts it as
/// reachable.
fn determine_next_hop(
    prefixes: &PrefixList,
    routers: &RouterList,
    neighbors: &NeighborCache,
    dest: &Ipv6Addr,
    unreachable: Option<&Ipv6Addr>,
) -> Result<Ipv6Addr> {
    if is_link_local(dest) || prefixes.is_on_link(dest) {
        return Ok(*dest);
    }
    routers
        .select(unreachable, |router| {
            Some(router) != unreachable
                && neighbors
                    .find(router)
                    .is_some_and(|n| n.state != NeighborState::Incomplete)
        })
        .ok_or(Error::NoRoute)
}
