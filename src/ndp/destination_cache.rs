//! Destination Cache - RFC 4861 §5.1
//!
//! Maps recently used destinations to their next hop and path MTU.

use super::Millis;
use crate::protocol::ipv6::MIN_MTU;
use crate::{Error, Result};
use std::net::Ipv6Addr;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationEntry {
    pub dest_addr: Ipv6Addr,
    pub next_hop: Ipv6Addr,
    pub path_mtu: u32,
    pub last_update: Millis,
}

#[derive(Debug)]
pub struct DestinationCache {
    slots: Vec<Option<DestinationEntry>>,
}

impl DestinationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
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

    pub fn iter(&self) -> impl Iterator<Item = &DestinationEntry> {
        self.slots.iter().flatten()
    }

    fn index_of(&self, dest: &Ipv6Addr) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|e| e.dest_addr == *dest))
    }

    pub fn find(&self, dest: &Ipv6Addr) -> Option<&DestinationEntry> {
        self.index_of(dest).and_then(|i| self.slots[i].as_ref())
    }

    /// Free slot, or the least recently updated one
    fn slot_for_new(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none).or_else(|| {
            self.slots
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.map(|e| (e.last_update, i)))
                .min()
                .map(|(_, i)| i)
        })
    }

    fn store(&mut self, entry: DestinationEntry) -> Result<()> {
        let index = self.slot_for_new().ok_or(Error::OutOfResources)?;
        if let Some(old) = self.slots[index].replace(entry) {
            trace!(dest = %old.dest_addr, "Destination entry recycled");
        }
        Ok(())
    }

    /// Cached entry for `dest`, creating it with `determine` on a miss
    ///
    /// `determine` yields the next hop and initial path MTU; its error (for
    /// example `NoRoute`) is returned unchanged and nothing is cached.
    pub fn find_or_create<F>(
        &mut self,
        dest: Ipv6Addr,
        now: Millis,
        determine: F,
    ) -> Result<DestinationEntry>
    where
        F: FnOnce() -> Result<(Ipv6Addr, u32)>,
    {
        if let Some(i) = self.index_of(&dest) {
            if let Some(entry) = self.slots[i].as_mut() {
                entry.last_update = now;
                return Ok(*entry);
            }
        }

        let (next_hop, path_mtu) = determine()?;
        let entry = DestinationEntry {
            dest_addr: dest,
            next_hop,
            path_mtu,
            last_update: now,
        };
        self.store(entry)?;
        Ok(entry)
    }

    /// Point `dest` at `next_hop`, creating the entry if needed (Redirect)
    pub fn update_next_hop(
        &mut self,
        dest: Ipv6Addr,
        next_hop: Ipv6Addr,
        path_mtu: u32,
        now: Millis,
    ) -> Result<()> {
        if let Some(i) = self.index_of(&dest) {
            if let Some(entry) = self.slots[i].as_mut() {
                entry.next_hop = next_hop;
                entry.last_update = now;
                return Ok(());
            }
        }

        self.store(DestinationEntry {
            dest_addr: dest,
            next_hop,
            path_mtu,
            last_update: now,
        })
    }

    /// Record a Packet Too Big report, clamped to [1280, link MTU]
    pub fn update_path_mtu(&mut self, dest: &Ipv6Addr, mtu: u32, link_mtu: u32) -> Result<u32> {
        let i = self.index_of(dest).ok_or(Error::NotFound)?;
        let clamped = mtu.clamp(MIN_MTU, link_mtu.max(MIN_MTU));
        if let Some(entry) = self.slots[i].as_mut() {
            entry.path_mtu = clamped;
        }
        Ok(clamped)
    }

    /// Lower every cached path MTU to at most `mtu` (link MTU shrank)
    pub fn cap_path_mtu(&mut self, mtu: u32) {
        for entry in self.slots.iter_mut().flatten() {
            entry.path_mtu = entry.path_mtu.min(mtu);
        }
    }

    /// Drop every entry using `next_hop`; returns how many were removed
    pub fn invalidate_next_hop(&mut self, next_hop: &Ipv6Addr) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if slot.is_some_and(|e| e.next_hop == *next_hop) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// Recompute the next hop of every entry using `next_hop`
    ///
    /// Entries for which `determine` fails are dropped; returns how many.
    pub fn reroute<F>(&mut self, next_hop: &Ipv6Addr, mut determine: F) -> usize
    where
        F: FnMut(&Ipv6Addr) -> Result<Ipv6Addr>,
    {
        let mut dropped = 0;
        for slot in self.slots.iter_mut() {
            let Some(dest) = slot.filter(|e| e.next_hop == *next_hop).map(|e| e.dest_addr) else {
                continue;
            };
            match determine(&dest) {
                Ok(new_hop) => {
                    if let Some(entry) = slot.as_mut() {
                        entry.next_hop = new_hop;
                    }
                }
                Err(_) => {
                    *slot = None;
                    dropped += 1;
                }
            }
        }
        dropped
    }

    pub fn remove(&mut self, dest: &Ipv6Addr) -> Option<DestinationEntry> {
        self.index_of(dest).and_then(|i| self.slots[i].take())
    }

    pub fn flush(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}
