//! Default Router List - RFC 4861 §6.3.4, preferences per RFC 4191

use super::age_lifetime;
use crate::protocol::ndp_option::RouterPreference;
use crate::{Error, Result};
use std::net::Ipv6Addr;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterEntry {
    /// Link-local address of the router
    pub addr: Ipv6Addr,
    /// Remaining ms
    pub lifetime: u32,
    pub preference: RouterPreference,
    pub permanent: bool,
}

#[derive(Debug)]
pub struct RouterList {
    slots: Vec<Option<RouterEntry>>,
}

impl RouterList {
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

    pub fn iter(&self) -> impl Iterator<Item = &RouterEntry> {
        self.slots.iter().flatten()
    }

    fn index_of(&self, addr: &Ipv6Addr) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.addr == *addr))
    }

    pub fn find(&self, addr: &Ipv6Addr) -> Option<&RouterEntry> {
        self.index_of(addr).and_then(|i| self.slots[i].as_ref())
    }

    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        self.index_of(addr).is_some()
    }

    /// Insert or refresh a router
    ///
    /// A configured (permanent) router only has its preference updated by
    /// advertisements. When full, the dynamic entry with the shortest
    /// remaining lifetime is replaced.
    pub fn upsert(&mut self, entry: RouterEntry) -> Result<Option<RouterEntry>> {
        if let Some(i) = self.index_of(&entry.addr) {
            if let Some(existing) = self.slots[i].as_mut() {
                existing.preference = entry.preference;
                if !existing.permanent {
                    existing.lifetime = entry.lifetime;
                    existing.permanent = entry.permanent;
                }
                return Ok(None);
            }
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .or_else(|| self.shortest_lived())
            .ok_or(Error::OutOfResources)?;

        let evicted = self.slots[index].replace(entry);
        if let Some(old) = &evicted {
            debug!(router = %old.addr, "Default router evicted");
        }
        Ok(evicted)
    }

    fn shortest_lived(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.as_ref()
                    .filter(|e| !e.permanent)
                    .map(|e| (e.lifetime, i))
            })
            .min()
            .map(|(_, i)| i)
    }

    pub fn remove(&mut self, addr: &Ipv6Addr) -> Option<RouterEntry> {
        self.index_of(addr).and_then(|i| self.slots[i].take())
    }

    /// Best default router: reachability first, then preference
    ///
    /// Ties go to the first candidate in round-robin order starting just
    /// after `after`, or at the head of the list when `after` is `None`.
    pub fn select<F>(&self, after: Option<&Ipv6Addr>, mut is_reachable: F) -> Option<Ipv6Addr>
    where
        F: FnMut(&Ipv6Addr) -> bool,
    {
        let start = after.and_then(|a| self.index_of(a)).map_or(0, |i| i + 1);
        let n = self.slots.len();

        let mut best: Option<((bool, RouterPreference), Ipv6Addr)> = None;
        for i in 0..n {
            let Some(entry) = self.slots[(start + i) % n].as_ref() else {
                continue;
            };
            let key = (is_reachable(&entry.addr), entry.preference);
            if best.as_ref().map_or(true, |(k, _)| key > *k) {
                best = Some((key, entry.addr));
            }
        }
        best.map(|(_, addr)| addr)
    }

    /// Drop learned routers; returns them so dependent state can be cleaned
    pub fn flush_dynamic(&mut self) -> Vec<RouterEntry> {
        let mut removed = Vec::new();
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|e| !e.permanent) {
                removed.extend(slot.take());
            }
        }
        removed
    }

    pub fn clear(&mut self) -> Vec<RouterEntry> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    /// Age dynamic routers; returns the expired ones
    pub fn tick(&mut self, elapsed: u32) -> Vec<RouterEntry> {
        let mut expired = Vec::new();
        for slot in self.slots.iter_mut() {
            let Some(entry) = slot.as_mut() else {
                continue;
            };
            if entry.permanent {
                continue;
            }
            entry.lifetime = age_lifetime(entry.lifetime, elapsed);
            if entry.lifetime == 0 {
                expired.extend(slot.take());
            }
        }
        expired
    }
}
