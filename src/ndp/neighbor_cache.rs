//! Neighbor Cache - RFC 4861 §7.3
//!
//! Fixed number of slots allocated at interface creation. Each entry carries
//! its own reachability state machine and a bounded FIFO of packets waiting
//! for address resolution.

use super::{
    InterfaceId, Millis, DELAY_FIRST_PROBE_TIME, MAX_MULTICAST_SOLICIT, MAX_UNICAST_SOLICIT,
};
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::collections::VecDeque;
use std::net::Ipv6Addr;
use tracing::{debug, trace};

/// Neighbor reachability state (RFC 4861 §7.3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    /// Address resolution in progress, waiting for NA
    Incomplete,
    /// Recently confirmed reachability
    Reachable,
    /// Reachability unknown, no traffic pending
    Stale,
    /// Traffic sent, waiting for upper-layer confirmation
    Delay,
    /// Unicast NS outstanding
    Probe,
}

impl NeighborState {
    /// Tie-break between equally old entries, lowest goes first
    fn eviction_rank(self) -> u8 {
        match self {
            NeighborState::Stale => 0,
            NeighborState::Probe => 1,
            NeighborState::Delay => 2,
            NeighborState::Incomplete => 3,
            NeighborState::Reachable => 4,
        }
    }
}

/// Where a queued packet came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOrigin {
    /// Generated by this host
    Local,
    /// Being forwarded; failures are reported back to the sender
    Forwarded { ingress: InterfaceId },
}

/// Packet waiting for its next hop to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    pub data: Vec<u8>,
    pub origin: PacketOrigin,
}

impl QueuedPacket {
    pub fn new(data: Vec<u8>, origin: PacketOrigin) -> Self {
        Self { data, origin }
    }
}

/// Neighbor Cache entry
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    pub ip_addr: Ipv6Addr,
    pub link_addr: Option<MacAddr>,
    pub state: NeighborState,
    pub is_router: bool,
    /// Interface clock at the last state change
    pub last_update: Millis,
    /// Remaining ms in the current state
    pub timeout: u32,
    pub retransmit_count: u8,
    queue: VecDeque<QueuedPacket>,
}

impl NeighborEntry {
    fn incomplete(ip_addr: Ipv6Addr, now: Millis, retrans_timer: u32) -> Self {
        Self {
            ip_addr,
            link_addr: None,
            state: NeighborState::Incomplete,
            is_router: false,
            last_update: now,
            timeout: retrans_timer,
            retransmit_count: 1,
            queue: VecDeque::new(),
        }
    }

    fn stale(ip_addr: Ipv6Addr, link_addr: MacAddr, now: Millis) -> Self {
        Self {
            ip_addr,
            link_addr: Some(link_addr),
            state: NeighborState::Stale,
            is_router: false,
            last_update: now,
            timeout: 0,
            retransmit_count: 0,
            queue: VecDeque::new(),
        }
    }

    fn set_state(&mut self, state: NeighborState, timeout: u32, now: Millis) {
        if self.state != state {
            trace!(
                addr = %self.ip_addr,
                from = ?self.state,
                to = ?state,
                "Neighbor state change"
            );
        }
        self.state = state;
        self.timeout = timeout;
        self.last_update = now;
    }

    /// Link-layer address usable for transmission
    pub fn resolved_addr(&self) -> Option<MacAddr> {
        match self.state {
            NeighborState::Incomplete => None,
            _ => self.link_addr,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued(&self) -> impl Iterator<Item = &QueuedPacket> {
        self.queue.iter()
    }

    /// Remove and return every queued packet in FIFO order
    pub fn take_queue(&mut self) -> Vec<QueuedPacket> {
        self.queue.drain(..).collect()
    }
}

/// Outcome of a resolution request against the cache
#[derive(Debug)]
pub enum ResolveStep {
    /// Usable link-layer address
    Resolved(MacAddr),
    /// New Incomplete entry; the first multicast NS must be sent
    Started { evicted: Option<NeighborEntry> },
    /// Resolution already running
    Pending,
}

/// Result of learning a link-layer address
#[derive(Debug, Default)]
pub struct Learned {
    /// Packets released from a formerly Incomplete entry, FIFO order
    pub flushed: Vec<QueuedPacket>,
    /// Entry recycled to make room
    pub evicted: Option<NeighborEntry>,
}

/// Result of applying a Neighbor Advertisement
#[derive(Debug, Default)]
pub struct Advertised {
    pub flushed: Vec<QueuedPacket>,
    /// Link-layer address to use for the flushed packets
    pub link_addr: Option<MacAddr>,
    /// The neighbor stopped advertising itself as a router
    pub router_cleared: bool,
}

/// Neighbor Advertisement fields relevant to the cache
#[derive(Debug, Clone, Copy)]
pub struct AdvertFlags {
    pub router: bool,
    pub solicited: bool,
    pub overrides: bool,
}

/// Timer work produced by [`NeighborCache::tick`]
#[derive(Debug)]
pub enum NeighborTimerEvent {
    SendMulticastSolicitation(Ipv6Addr),
    SendUnicastSolicitation { addr: Ipv6Addr, link_addr: MacAddr },
    /// Resolution or probing failed; the entry has been removed
    Unreachable(NeighborEntry),
}

/// Fixed-capacity Neighbor Cache
#[derive(Debug)]
pub struct NeighborCache {
    slots: Vec<Option<NeighborEntry>>,
    queue_len: usize,
}

impl NeighborCache {
    pub fn new(capacity: usize, queue_len: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            queue_len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.slots.iter().flatten()
    }

    fn index_of(&self, addr: &Ipv6Addr) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.ip_addr == *addr))
    }

    pub fn find(&self, addr: &Ipv6Addr) -> Option<&NeighborEntry> {
        self.index_of(addr).and_then(|i| self.slots[i].as_ref())
    }

    pub fn find_mut(&mut self, addr: &Ipv6Addr) -> Option<&mut NeighborEntry> {
        match self.index_of(addr) {
            Some(i) => self.slots[i].as_mut(),
            None => None,
        }
    }

    /// Pick a slot to recycle: the least recently updated entry in any
    /// state, Stale first among entries of the same age
    fn eviction_victim(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let entry = slot.as_ref()?;
                Some((entry.last_update, entry.state.eviction_rank(), i))
            })
            .min()
            .map(|(_, _, i)| i)
    }

    /// Store a new entry, recycling a slot if the cache is full
    fn insert(&mut self, entry: NeighborEntry) -> Result<Option<NeighborEntry>> {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some(entry);
            return Ok(None);
        }

        let victim = self.eviction_victim().ok_or(Error::OutOfResources)?;
        let evicted = self.slots[victim].replace(entry);
        if let Some(old) = &evicted {
            debug!(
                addr = %old.ip_addr,
                state = ?old.state,
                queued = old.queue.len(),
                "Neighbor entry evicted"
            );
        }
        Ok(evicted)
    }

    pub fn remove(&mut self, addr: &Ipv6Addr) -> Option<NeighborEntry> {
        self.index_of(addr).and_then(|i| self.slots[i].take())
    }

    /// Empty every slot, returning the removed entries
    pub fn clear(&mut self) -> Vec<NeighborEntry> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    /// Look up `addr` for transmission, starting resolution when unknown
    pub fn resolve(
        &mut self,
        addr: Ipv6Addr,
        now: Millis,
        retrans_timer: u32,
    ) -> Result<ResolveStep> {
        let Some(entry) = self.find_mut(&addr) else {
            let evicted = self.insert(NeighborEntry::incomplete(addr, now, retrans_timer))?;
            debug!(addr = %addr, "Starting address resolution");
            return Ok(ResolveStep::Started { evicted });
        };

        match (entry.state, entry.link_addr) {
            (NeighborState::Incomplete, _) | (_, None) => Ok(ResolveStep::Pending),
            (NeighborState::Stale, Some(mac)) => {
                entry.set_state(NeighborState::Delay, DELAY_FIRST_PROBE_TIME, now);
                Ok(ResolveStep::Resolved(mac))
            }
            (_, Some(mac)) => Ok(ResolveStep::Resolved(mac)),
        }
    }

    /// Queue a packet on an existing entry; returns the packet dropped to
    /// make room, if any
    pub fn enqueue(
        &mut self,
        addr: &Ipv6Addr,
        packet: QueuedPacket,
    ) -> Result<Option<QueuedPacket>> {
        let limit = self.queue_len;
        let entry = self.find_mut(addr).ok_or(Error::NotFound)?;

        if limit == 0 {
            return Ok(Some(packet));
        }

        let dropped = if entry.queue.len() >= limit {
            entry.queue.pop_front()
        } else {
            None
        };
        entry.queue.push_back(packet);
        Ok(dropped)
    }

    /// Link-layer address carried by an NS, RS, RA or Redirect (RFC 4861
    /// §7.2.3, §6.2.6, §6.3.4, §8.3)
    ///
    /// An Incomplete entry that releases queued packets goes to Delay so the
    /// new address gets probed; otherwise it becomes Stale.
    pub fn learn(&mut self, addr: Ipv6Addr, mac: MacAddr, now: Millis) -> Result<Learned> {
        let Some(entry) = self.find_mut(&addr) else {
            let evicted = self.insert(NeighborEntry::stale(addr, mac, now))?;
            return Ok(Learned {
                flushed: Vec::new(),
                evicted,
            });
        };

        let mut learned = Learned::default();
        if entry.state == NeighborState::Incomplete {
            entry.link_addr = Some(mac);
            entry.retransmit_count = 0;
            learned.flushed = entry.take_queue();
            if learned.flushed.is_empty() {
                entry.set_state(NeighborState::Stale, 0, now);
            } else {
                entry.set_state(NeighborState::Delay, DELAY_FIRST_PROBE_TIME, now);
            }
        } else if entry.link_addr != Some(mac) {
            entry.link_addr = Some(mac);
            entry.retransmit_count = 0;
            entry.set_state(NeighborState::Stale, 0, now);
        }
        Ok(learned)
    }

    /// Apply a Neighbor Advertisement for `target` (RFC 4861 §7.2.5)
    ///
    /// Advertisements for unknown targets are ignored.
    pub fn advertise(
        &mut self,
        target: &Ipv6Addr,
        tlla: Option<MacAddr>,
        flags: AdvertFlags,
        now: Millis,
        reachable_time: u32,
    ) -> Advertised {
        let mut result = Advertised::default();
        let Some(entry) = self.find_mut(target) else {
            trace!(target = %target, "NA for unknown neighbor ignored");
            return result;
        };

        if entry.state == NeighborState::Incomplete {
            let Some(mac) = tlla else {
                return result;
            };
            entry.link_addr = Some(mac);
            entry.is_router = flags.router;
            entry.retransmit_count = 0;
            if flags.solicited {
                entry.set_state(NeighborState::Reachable, reachable_time, now);
            } else {
                entry.set_state(NeighborState::Stale, 0, now);
            }
            result.flushed = entry.take_queue();
            result.link_addr = Some(mac);
            return result;
        }

        let changed = tlla.is_some_and(|mac| entry.link_addr != Some(mac));
        if !flags.overrides && changed {
            // Keep the cached address, only weaken confidence in it
            if entry.state == NeighborState::Reachable {
                entry.set_state(NeighborState::Stale, 0, now);
            }
            return result;
        }

        if let Some(mac) = tlla {
            entry.link_addr = Some(mac);
        }
        if flags.solicited {
            entry.retransmit_count = 0;
            entry.set_state(NeighborState::Reachable, reachable_time, now);
        } else if changed {
            entry.set_state(NeighborState::Stale, 0, now);
        }

        if entry.is_router && !flags.router {
            result.router_cleared = true;
        }
        entry.is_router = flags.router;
        result.link_addr = entry.link_addr;
        result
    }

    /// Upper-layer reachability confirmation
    pub fn confirm_reachability(
        &mut self,
        addr: &Ipv6Addr,
        now: Millis,
        reachable_time: u32,
    ) -> bool {
        match self.find_mut(addr) {
            Some(entry)
                if entry.link_addr.is_some() && entry.state != NeighborState::Incomplete =>
            {
                entry.retransmit_count = 0;
                entry.set_state(NeighborState::Reachable, reachable_time, now);
                true
            }
            _ => false,
        }
    }

    /// Mark a neighbor as a router (Redirect target distinct from destination)
    pub fn set_router(&mut self, addr: &Ipv6Addr, is_router: bool) {
        if let Some(entry) = self.find_mut(addr) {
            entry.is_router = is_router;
        }
    }

    /// Advance every entry by `elapsed` ms
    pub fn tick(
        &mut self,
        elapsed: u32,
        now: Millis,
        retrans_timer: u32,
    ) -> Vec<NeighborTimerEvent> {
        let mut events = Vec::new();

        for slot in self.slots.iter_mut() {
            let Some(entry) = slot.as_mut() else {
                continue;
            };
            if entry.state == NeighborState::Stale {
                continue;
            }

            entry.timeout = entry.timeout.saturating_sub(elapsed);
            if entry.timeout > 0 {
                continue;
            }

            match entry.state {
                NeighborState::Incomplete => {
                    if entry.retransmit_count >= MAX_MULTICAST_SOLICIT {
                        if let Some(failed) = slot.take() {
                            events.push(NeighborTimerEvent::Unreachable(failed));
                        }
                    } else {
                        entry.retransmit_count += 1;
                        entry.timeout = retrans_timer;
                        events.push(NeighborTimerEvent::SendMulticastSolicitation(entry.ip_addr));
                    }
                }
                NeighborState::Reachable => {
                    entry.set_state(NeighborState::Stale, 0, now);
                }
                NeighborState::Delay => {
                    entry.retransmit_count = 1;
                    entry.set_state(NeighborState::Probe, retrans_timer, now);
                    if let Some(mac) = entry.link_addr {
                        events.push(NeighborTimerEvent::SendUnicastSolicitation {
                            addr: entry.ip_addr,
                            link_addr: mac,
                        });
                    }
                }
                NeighborState::Probe => {
                    if entry.retransmit_count >= MAX_UNICAST_SOLICIT {
                        if let Some(failed) = slot.take() {
                            events.push(NeighborTimerEvent::Unreachable(failed));
                        }
                    } else {
                        entry.retransmit_count += 1;
                        entry.timeout = retrans_timer;
                        if let Some(mac) = entry.link_addr {
                            events.push(NeighborTimerEvent::SendUnicastSolicitation {
                                addr: entry.ip_addr,
                                link_addr: mac,
                            });
                        }
                    }
                }
                NeighborState::Stale => {}
            }
        }

        events
    }
}
