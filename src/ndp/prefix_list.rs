//! Prefix List - RFC 4861 §6.3.4
//!
//! On-link prefixes learned from Router Advertisements or configured
//! statically. Lifetimes are kept in milliseconds.

use super::{age_lifetime, LIFETIME_INFINITE};
use crate::protocol::ipv6::{mask_prefix, prefix_matches};
use crate::{Error, Result};
use std::net::Ipv6Addr;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixEntry {
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    pub on_link: bool,
    pub autonomous: bool,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub permanent: bool,
}

impl PrefixEntry {
    /// Statically configured on-link prefix
    pub fn permanent(prefix: Ipv6Addr, prefix_len: u8) -> Self {
        Self {
            prefix: mask_prefix(&prefix, prefix_len),
            prefix_len,
            on_link: true,
            autonomous: false,
            valid_lifetime: LIFETIME_INFINITE,
            preferred_lifetime: LIFETIME_INFINITE,
            permanent: true,
        }
    }

    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        prefix_matches(&self.prefix, addr, self.prefix_len)
    }
}

#[derive(Debug)]
pub struct PrefixList {
    slots: Vec<Option<PrefixEntry>>,
}

impl PrefixList {
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

    pub fn iter(&self) -> impl Iterator<Item = &PrefixEntry> {
        self.slots.iter().flatten()
    }

    fn index_of(&self, prefix: &Ipv6Addr, prefix_len: u8) -> Option<usize> {
        let prefix = mask_prefix(prefix, prefix_len);
        self.slots.iter().position(|s| {
            s.as_ref()
                .is_some_and(|e| e.prefix_len == prefix_len && e.prefix == prefix)
        })
    }

    pub fn find(&self, prefix: &Ipv6Addr, prefix_len: u8) -> Option<&PrefixEntry> {
        self.index_of(prefix, prefix_len)
            .and_then(|i| self.slots[i].as_ref())
    }

    /// Whether `addr` falls inside any on-link prefix
    pub fn is_on_link(&self, addr: &Ipv6Addr) -> bool {
        self.iter().any(|e| e.on_link && e.contains(addr))
    }

    /// Insert or refresh a prefix
    ///
    /// Order of preference: the matching entry, a free slot, then the
    /// dynamic entry with the shortest remaining valid lifetime. Permanent
    /// entries keep their lifetimes when refreshed.
    pub fn upsert(&mut self, mut entry: PrefixEntry) -> Result<()> {
        entry.prefix = mask_prefix(&entry.prefix, entry.prefix_len);

        if let Some(i) = self.index_of(&entry.prefix, entry.prefix_len) {
            if let Some(existing) = self.slots[i].as_mut() {
                if existing.permanent {
                    existing.autonomous = entry.autonomous;
                } else {
                    *existing = entry;
                }
                return Ok(());
            }
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .or_else(|| self.shortest_lived())
            .ok_or(Error::OutOfResources)?;

        if let Some(old) = &self.slots[index] {
            debug!(prefix = %old.prefix, len = old.prefix_len, "Prefix evicted");
        }
        self.slots[index] = Some(entry);
        Ok(())
    }

    fn shortest_lived(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.as_ref()
                    .filter(|e| !e.permanent)
                    .map(|e| (e.valid_lifetime, i))
            })
            .min()
            .map(|(_, i)| i)
    }

    pub fn remove(&mut self, prefix: &Ipv6Addr, prefix_len: u8) -> Option<PrefixEntry> {
        self.index_of(prefix, prefix_len)
            .and_then(|i| self.slots[i].take())
    }

    /// Drop dynamic entries, keep configured ones
    pub fn flush_dynamic(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|e| !e.permanent) {
                *slot = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    /// Age dynamic entries; returns those whose valid lifetime ran out
    pub fn tick(&mut self, elapsed: u32) -> Vec<PrefixEntry> {
        let mut expired = Vec::new();
        for slot in self.slots.iter_mut() {
            let Some(entry) = slot.as_mut() else {
                continue;
            };
            if entry.permanent {
                continue;
            }
            entry.valid_lifetime = age_lifetime(entry.valid_lifetime, elapsed);
            entry.preferred_lifetime = age_lifetime(entry.preferred_lifetime, elapsed);
            if entry.valid_lifetime == 0 {
                if let Some(gone) = slot.take() {
                    debug!(prefix = %gone.prefix, len = gone.prefix_len, "Prefix expired");
                    expired.push(gone);
                }
            }
        }
        expired
    }
}
