//! Thread-safe Neighbor Discovery façade
//!
//! A single mutex guards every interface. Each public operation takes it
//! once, collects [`NdpAction`]s, releases it and only then talks to the
//! [`LinkLayer`] or the event callback, so both may call back into the
//! stack.

use super::processor::process_message;
use super::{
    AddressState, InterfaceId, InterfaceNdpContext, Lifetimes, NdpAction, NdpEvent,
    PacketOrigin, PseudoHeader, QueuedPacket, Resolution, RouterAdvSettings, NDP_HOP_LIMIT,
};
use crate::config::{parse_prefix, Config, NdpSettings, RouterAdvConfig};
use crate::protocol::icmpv6::{set_checksum, Icmpv6Type};
use crate::protocol::ipv6::MIN_MTU;
use crate::protocol::ndp_option::RouterPreference;
use crate::protocol::MacAddr;
use crate::telemetry::{NdpMetrics, TableSizes};
use crate::{Error, Result};
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Transmit primitives of the embedding IPv6 stack
pub trait LinkLayer: Send + Sync {
    /// Send an ICMPv6 NDP message; `message` already carries its checksum
    fn send_ndp_message(
        &self,
        interface: InterfaceId,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        link_dst: MacAddr,
        message: &[u8],
        hop_limit: u8,
    ) -> Result<()>;

    /// Send an IPv6 packet to a resolved link-layer address
    fn send_packet(&self, interface: InterfaceId, link_dst: MacAddr, packet: &[u8]) -> Result<()>;

    /// Report an undeliverable forwarded packet with ICMPv6 Destination
    /// Unreachable (code 3, address unreachable)
    fn send_dest_unreachable(&self, interface: InterfaceId, packet: &[u8]) -> Result<()>;
}

pub type EventCallback = Arc<dyn Fn(&NdpEvent) + Send + Sync>;

pub struct NdpStack {
    interfaces: Mutex<HashMap<InterfaceId, InterfaceNdpContext>>,
    link: Arc<dyn LinkLayer>,
    on_event: Mutex<Option<EventCallback>>,
    settings: NdpSettings,
    metrics: Arc<NdpMetrics>,
}

impl NdpStack {
    pub fn new(link: Arc<dyn LinkLayer>, settings: NdpSettings) -> Self {
        Self {
            interfaces: Mutex::new(HashMap::new()),
            link,
            on_event: Mutex::new(None),
            settings,
            metrics: Arc::new(NdpMetrics::new()),
        }
    }

    /// Build a stack with every configured interface, address, prefix and
    /// router in place
    pub fn from_config(config: &Config, link: Arc<dyn LinkLayer>) -> Result<Self> {
        let stack = Self::new(link, config.ndp.clone());

        for (name, iface) in &config.interfaces {
            let mac = iface.mac_addr()?;
            stack.add_interface(iface.id, name, mac, iface.mtu)?;

            let prefixes = iface
                .prefixes
                .iter()
                .map(|p| parse_prefix(p))
                .collect::<Result<Vec<_>>>()?;
            let router_adv = iface
                .router_adv
                .as_ref()
                .map(RouterAdvConfig::to_settings)
                .transpose()?;

            stack.run(iface.id, |ctx, actions| -> Result<()> {
                if iface.link_local {
                    ctx.add_address(mac.link_local(), None, false, actions)?;
                }
                for addr in &iface.addresses {
                    ctx.add_address(*addr, None, false, actions)?;
                }
                for addr in &iface.anycast {
                    ctx.add_address(*addr, None, true, actions)?;
                }
                for (prefix, len) in &prefixes {
                    ctx.add_prefix(*prefix, *len)?;
                }
                for router in &iface.routers {
                    ctx.add_default_router(router.address, router.preference.into())?;
                }
                if let Some(settings) = router_adv {
                    ctx.start_advertising(settings)?;
                }
                if iface.up {
                    ctx.link_up(actions);
                }
                Ok(())
            })??;

            info!(
                interface = %name,
                id = iface.id,
                mac = %mac,
                mtu = iface.mtu,
                router = iface.router_adv.is_some(),
                "Interface configured"
            );
        }

        Ok(stack)
    }

    /// Register the receiver of [`NdpEvent`]s, replacing any previous one
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(&NdpEvent) + Send + Sync + 'static,
    {
        let mut slot = self.on_event.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Arc::new(callback));
    }

    pub fn metrics(&self) -> &Arc<NdpMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &NdpSettings {
        &self.settings
    }

    /// Period the tick driver should use
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.settings.tick_interval_ms))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InterfaceId, InterfaceNdpContext>> {
        self.interfaces.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a new interface; its link starts down
    pub fn add_interface(
        &self,
        id: InterfaceId,
        name: &str,
        mac: MacAddr,
        link_mtu: u32,
    ) -> Result<()> {
        if link_mtu < MIN_MTU {
            return Err(Error::InvalidParameter(format!(
                "MTU {} is below the IPv6 minimum of {}",
                link_mtu, MIN_MTU
            )));
        }

        let mut interfaces = self.lock();
        if interfaces.contains_key(&id) {
            return Err(Error::InvalidParameter(format!(
                "interface {} already exists",
                id
            )));
        }
        self.metrics.register_interface(name);
        let ctx =
            InterfaceNdpContext::new(id, name, mac, link_mtu, &self.settings, self.metrics.clone());
        interfaces.insert(id, ctx);
        debug!(interface = %name, id, "Interface added");
        Ok(())
    }

    /// Detach an interface; a router interface first withdraws itself
    /// with a zero-lifetime RA
    pub fn remove_interface(&self, id: InterfaceId) -> Result<()> {
        let mut actions = Vec::new();
        let removed = self.lock().remove(&id);
        let result = match removed {
            Some(mut ctx) => {
                if ctx.is_router() {
                    ctx.stop_advertising(&mut actions)?;
                }
                debug!(interface = %ctx.name(), id, "Interface removed");
                Ok(())
            }
            None => Err(Error::InterfaceNotFound { id }),
        };
        self.dispatch(actions);
        result
    }

    /// Read-only access to one interface's state
    pub fn with_interface<R>(
        &self,
        id: InterfaceId,
        f: impl FnOnce(&InterfaceNdpContext) -> R,
    ) -> Result<R> {
        let interfaces = self.lock();
        let ctx = interfaces.get(&id).ok_or(Error::InterfaceNotFound { id })?;
        Ok(f(ctx))
    }

    /// Run `f` under the lock, then execute what it produced
    fn run<R>(
        &self,
        id: InterfaceId,
        f: impl FnOnce(&mut InterfaceNdpContext, &mut Vec<NdpAction>) -> R,
    ) -> Result<R> {
        let mut actions = Vec::new();
        let result = {
            let mut interfaces = self.lock();
            let ctx = interfaces
                .get_mut(&id)
                .ok_or(Error::InterfaceNotFound { id })?;
            f(ctx, &mut actions)
        };
        self.dispatch(actions);
        Ok(result)
    }

    fn dispatch(&self, actions: Vec<NdpAction>) {
        if actions.is_empty() {
            return;
        }
        let callback = self
            .on_event
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for action in actions {
            match action {
                NdpAction::SendNdp {
                    interface,
                    src,
                    dst,
                    link_dst,
                    message,
                } => {
                    let mut bytes = message.to_bytes();
                    set_checksum(&mut bytes, &src, &dst);
                    let sent = self.link.send_ndp_message(
                        interface,
                        src,
                        dst,
                        link_dst,
                        &bytes,
                        NDP_HOP_LIMIT,
                    );
                    if let Err(e) = sent {
                        warn!(interface, dst = %dst, error = %e, "Failed to send NDP message");
                    }
                }
                NdpAction::Transmit {
                    interface,
                    link_dst,
                    packet,
                } => {
                    if let Err(e) = self.link.send_packet(interface, link_dst, &packet) {
                        warn!(
                            interface,
                            link_dst = %link_dst,
                            error = %e,
                            "Failed to send packet"
                        );
                    }
                }
                NdpAction::DestinationUnreachable { interface, packet } => {
                    if let Err(e) = self.link.send_dest_unreachable(interface, &packet) {
                        warn!(interface, error = %e, "Failed to send Destination Unreachable");
                    }
                }
                NdpAction::Event(event) => {
                    if let Some(callback) = &callback {
                        callback(&event);
                    }
                }
            }
        }
    }

    // ===== Link state =====

    pub fn link_up(&self, id: InterfaceId) -> Result<()> {
        self.run(id, |ctx, actions| ctx.link_up(actions))
    }

    pub fn link_down(&self, id: InterfaceId) -> Result<()> {
        self.run(id, |ctx, _| ctx.link_down())
    }

    // ===== Router mode =====

    /// Start sending Router Advertisements on `id`
    pub fn start_router_advertisements(
        &self,
        id: InterfaceId,
        settings: RouterAdvSettings,
    ) -> Result<()> {
        self.run(id, |ctx, _| ctx.start_advertising(settings))?
    }

    /// Withdraw the router with a final zero-lifetime RA
    pub fn stop_router_advertisements(&self, id: InterfaceId) -> Result<()> {
        self.run(id, |ctx, actions| ctx.stop_advertising(actions))?
    }

    /// Send a Redirect about a packet this router is forwarding on `id`
    pub fn send_redirect(&self, id: InterfaceId, target: &Ipv6Addr, packet: &[u8]) -> Result<()> {
        self.run(id, |ctx, actions| ctx.send_redirect(target, packet, actions))?
    }

    // ===== Timers =====

    /// Advance every interface by the configured tick interval
    pub fn tick(&self) {
        self.tick_elapsed(self.settings.tick_interval_ms);
    }

    /// Advance every interface by `elapsed` ms
    pub fn tick_elapsed(&self, elapsed: u32) {
        let mut actions = Vec::new();
        {
            let mut interfaces = self.lock();
            let mut sizes = TableSizes::default();
            for ctx in interfaces.values_mut() {
                ctx.tick(elapsed, &mut actions);
                sizes.neighbors += ctx.neighbors().len();
                sizes.destinations += ctx.destinations().len();
                sizes.prefixes += ctx.prefixes().len();
                sizes.routers += ctx.routers().len();
                sizes.addresses += ctx.addresses().len();
            }
            self.metrics.set_table_sizes(sizes);
        }
        self.dispatch(actions);
    }

    // ===== Outbound =====

    /// Link-layer address for `dest`; on `InProgress` hand the packet to
    /// [`NdpStack::enqueue`]
    pub fn resolve(&self, id: InterfaceId, dest: &Ipv6Addr) -> Result<Resolution> {
        self.run(id, |ctx, actions| ctx.resolve(dest, actions))?
    }

    /// Send `packet` to `dest`, queueing it while the next hop resolves
    pub fn enqueue(
        &self,
        id: InterfaceId,
        dest: &Ipv6Addr,
        packet: Vec<u8>,
        origin: PacketOrigin,
    ) -> Result<()> {
        let packet = QueuedPacket::new(packet, origin);
        self.run(id, |ctx, actions| ctx.enqueue(dest, packet, actions))?
    }

    /// Upper-layer confirmation of forward progress towards `addr`
    pub fn reachability_hint(&self, id: InterfaceId, addr: &Ipv6Addr) -> Result<bool> {
        self.run(id, |ctx, _| ctx.reachability_hint(addr))
    }

    pub fn path_mtu(&self, id: InterfaceId, dest: &Ipv6Addr) -> Result<u32> {
        self.with_interface(id, |ctx| ctx.path_mtu(dest))
    }

    /// Record an ICMPv6 Packet Too Big; returns the MTU now in effect
    pub fn update_path_mtu(&self, id: InterfaceId, dest: &Ipv6Addr, mtu: u32) -> Result<u32> {
        self.run(id, |ctx, _| ctx.update_path_mtu(dest, mtu))?
    }

    // ===== Inbound =====

    /// Process any NDP message, dispatching on its ICMPv6 type
    pub fn on_ndp_message(&self, id: InterfaceId, hdr: &PseudoHeader, bytes: &[u8]) -> Result<()> {
        self.receive(id, hdr, bytes, None)
    }

    pub fn on_neighbor_solicitation(
        &self,
        id: InterfaceId,
        hdr: &PseudoHeader,
        bytes: &[u8],
    ) -> Result<()> {
        self.receive(id, hdr, bytes, Some(Icmpv6Type::NeighborSolicitation))
    }

    pub fn on_neighbor_advertisement(
        &self,
        id: InterfaceId,
        hdr: &PseudoHeader,
        bytes: &[u8],
    ) -> Result<()> {
        self.receive(id, hdr, bytes, Some(Icmpv6Type::NeighborAdvertisement))
    }

    pub fn on_router_solicitation(
        &self,
        id: InterfaceId,
        hdr: &PseudoHeader,
        bytes: &[u8],
    ) -> Result<()> {
        self.receive(id, hdr, bytes, Some(Icmpv6Type::RouterSolicitation))
    }

    pub fn on_router_advertisement(
        &self,
        id: InterfaceId,
        hdr: &PseudoHeader,
        bytes: &[u8],
    ) -> Result<()> {
        self.receive(id, hdr, bytes, Some(Icmpv6Type::RouterAdvertisement))
    }

    pub fn on_redirect(&self, id: InterfaceId, hdr: &PseudoHeader, bytes: &[u8]) -> Result<()> {
        self.receive(id, hdr, bytes, Some(Icmpv6Type::Redirect))
    }

    fn receive(
        &self,
        id: InterfaceId,
        hdr: &PseudoHeader,
        bytes: &[u8],
        expected: Option<Icmpv6Type>,
    ) -> Result<()> {
        self.run(id, |ctx, actions| {
            process_message(ctx, hdr, bytes, expected, actions)
        })
    }

    // ===== List mutation =====

    /// Assign an address; `None` lifetimes make it permanent
    pub fn add_address(
        &self,
        id: InterfaceId,
        addr: Ipv6Addr,
        lifetimes: Option<Lifetimes>,
        anycast: bool,
    ) -> Result<AddressState> {
        self.run(id, |ctx, actions| ctx.add_address(addr, lifetimes, anycast, actions))?
    }

    pub fn remove_address(&self, id: InterfaceId, addr: &Ipv6Addr) -> Result<()> {
        self.run(id, |ctx, actions| ctx.remove_address(addr, actions))?
    }

    pub fn add_prefix(&self, id: InterfaceId, prefix: Ipv6Addr, prefix_len: u8) -> Result<()> {
        self.run(id, |ctx, _| ctx.add_prefix(prefix, prefix_len))?
    }

    pub fn remove_prefix(
        &self,
        id: InterfaceId,
        prefix: &Ipv6Addr,
        prefix_len: u8,
    ) -> Result<()> {
        self.run(id, |ctx, _| ctx.remove_prefix(prefix, prefix_len))?
    }

    pub fn add_default_router(
        &self,
        id: InterfaceId,
        addr: Ipv6Addr,
        preference: RouterPreference,
    ) -> Result<()> {
        self.run(id, |ctx, _| ctx.add_default_router(addr, preference))?
    }

    pub fn remove_default_router(&self, id: InterfaceId, addr: &Ipv6Addr) -> Result<()> {
        self.run(id, |ctx, _| ctx.remove_default_router(addr))?
    }

    pub fn flush_neighbors(&self, id: InterfaceId) -> Result<()> {
        self.run(id, |ctx, _| ctx.flush_neighbors())
    }

    pub fn flush_destinations(&self, id: InterfaceId) -> Result<()> {
        self.run(id, |ctx, _| ctx.flush_destinations())
    }

    pub fn flush_prefixes(&self, id: InterfaceId) -> Result<()> {
        self.run(id, |ctx, _| ctx.flush_prefixes())
    }

    pub fn flush_routers(&self, id: InterfaceId) -> Result<()> {
        self.run(id, |ctx, _| ctx.flush_routers())
    }
}
