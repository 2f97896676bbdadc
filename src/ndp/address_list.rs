//! Interface address list with DAD state - RFC 4862 §5
//!
//! Slot 0 is reserved for the link-local address. Permanent (statically
//! configured) addresses are never recycled; when DAD proves one a duplicate
//! it stays in place as Invalid.

use super::{age_lifetime, lifetime_ms, LIFETIME_INFINITE};
use crate::protocol::ipv6::{common_prefix_len, is_link_local};
use crate::{Error, Result};
use std::net::Ipv6Addr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressState {
    Invalid,
    /// DAD in progress; not usable as a source
    Tentative,
    Preferred,
    /// Valid but should not be chosen for new communication
    Deprecated,
}

impl AddressState {
    pub fn is_valid(self) -> bool {
        matches!(self, AddressState::Preferred | AddressState::Deprecated)
    }
}

/// Lifetimes in seconds as advertised; `0xffffffff` is infinite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetimes {
    pub valid: u32,
    pub preferred: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub addr: Ipv6Addr,
    pub state: AddressState,
    /// Remaining ms
    pub valid_lifetime: u32,
    /// Remaining ms
    pub preferred_lifetime: u32,
    pub permanent: bool,
    pub duplicate: bool,
    pub anycast: bool,
    /// Remaining ms until the next DAD step
    pub dad_timeout: u32,
    /// DAD probes sent so far
    pub dad_retransmit_count: u8,
}

impl AddressEntry {
    fn new(addr: Ipv6Addr, lifetimes: Option<Lifetimes>, anycast: bool) -> Self {
        let (valid, preferred, permanent) = match lifetimes {
            Some(l) => (lifetime_ms(l.valid), lifetime_ms(l.preferred), false),
            None => (LIFETIME_INFINITE, LIFETIME_INFINITE, true),
        };
        Self {
            addr,
            state: AddressState::Tentative,
            valid_lifetime: valid,
            preferred_lifetime: preferred,
            permanent,
            duplicate: false,
            anycast,
            dad_timeout: 0,
            dad_retransmit_count: 0,
        }
    }

    /// State once DAD has succeeded
    fn settled_state(&self) -> AddressState {
        if self.preferred_lifetime == 0 {
            AddressState::Deprecated
        } else {
            AddressState::Preferred
        }
    }

    /// Enter Tentative with a fresh DAD run, or settle right away when DAD
    /// is disabled or not applicable
    fn begin_dad(&mut self, initial_delay: u32, dad_transmits: u8) {
        self.duplicate = false;
        self.dad_retransmit_count = 0;
        if dad_transmits == 0 || self.anycast {
            self.state = self.settled_state();
            self.dad_timeout = 0;
        } else {
            self.state = AddressState::Tentative;
            self.dad_timeout = initial_delay;
        }
    }
}

/// Timer work produced by [`AddressList::tick`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressTimerEvent {
    /// Send a DAD probe (NS from ::) for this address
    SendDadSolicitation(Ipv6Addr),
    StateChanged { addr: Ipv6Addr, state: AddressState },
}

#[derive(Debug)]
pub struct AddressList {
    slots: Vec<Option<AddressEntry>>,
}

impl AddressList {
    /// `capacity` includes the link-local slot
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
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

    pub fn iter(&self) -> impl Iterator<Item = &AddressEntry> {
        self.slots.iter().flatten()
    }

    fn index_of(&self, addr: &Ipv6Addr) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.addr == *addr))
    }

    pub fn find(&self, addr: &Ipv6Addr) -> Option<&AddressEntry> {
        self.index_of(addr).and_then(|i| self.slots[i].as_ref())
    }

    /// Link-local address held in slot 0
    pub fn link_local(&self) -> Option<&AddressEntry> {
        self.slots[0].as_ref()
    }

    /// Whether `addr` is assigned and past DAD
    pub fn is_valid(&self, addr: &Ipv6Addr) -> bool {
        self.find(addr).is_some_and(|e| e.state.is_valid())
    }

    pub fn is_tentative(&self, addr: &Ipv6Addr) -> bool {
        self.find(addr)
            .is_some_and(|e| e.state == AddressState::Tentative)
    }

    /// Source for a packet to `dest`: a valid address sharing the longest
    /// prefix, Preferred over Deprecated
    pub fn select_source(&self, dest: &Ipv6Addr) -> Option<Ipv6Addr> {
        let dest_link_local = is_link_local(dest);
        self.iter()
            .filter(|e| e.state.is_valid() && !e.anycast)
            .filter(|e| !dest_link_local || is_link_local(&e.addr))
            .max_by_key(|e| {
                (
                    e.state == AddressState::Preferred,
                    common_prefix_len(&e.addr, dest),
                )
            })
            .map(|e| e.addr)
    }

    /// Add or refresh an address
    ///
    /// `lifetimes` of `None` makes the address permanent. New addresses start
    /// DAD after `initial_delay` ms. Returns the resulting state.
    pub fn add(
        &mut self,
        addr: Ipv6Addr,
        lifetimes: Option<Lifetimes>,
        anycast: bool,
        initial_delay: u32,
        dad_transmits: u8,
    ) -> Result<AddressState> {
        if addr.is_unspecified() || addr.is_multicast() {
            return Err(Error::InvalidParameter(format!(
                "{} cannot be assigned to an interface",
                addr
            )));
        }

        if let Some(i) = self.index_of(&addr) {
            if let Some(entry) = self.slots[i].as_mut() {
                if let (Some(l), false) = (lifetimes, entry.permanent) {
                    entry.valid_lifetime = lifetime_ms(l.valid);
                    entry.preferred_lifetime = lifetime_ms(l.preferred);
                    if entry.state == AddressState::Deprecated && entry.preferred_lifetime > 0 {
                        entry.state = AddressState::Preferred;
                    }
                }
                return Ok(entry.state);
            }
        }

        let index = if is_link_local(&addr) {
            if let Some(old) = &self.slots[0] {
                debug!(old = %old.addr, new = %addr, "Replacing link-local address");
            }
            0
        } else {
            self.slots
                .iter()
                .skip(1)
                .position(Option::is_none)
                .map(|i| i + 1)
                .ok_or(Error::OutOfResources)?
        };

        let mut entry = AddressEntry::new(addr, lifetimes, anycast);
        entry.begin_dad(initial_delay, dad_transmits);
        let state = entry.state;
        self.slots[index] = Some(entry);

        debug!(addr = %addr, state = ?state, anycast, "Address added");
        Ok(state)
    }

    pub fn remove(&mut self, addr: &Ipv6Addr) -> Option<AddressEntry> {
        self.index_of(addr).and_then(|i| self.slots[i].take())
    }

    /// DAD found another node using `addr`
    ///
    /// Only Tentative addresses are affected. Returns true if the address
    /// was marked duplicate.
    pub fn mark_duplicate(&mut self, addr: &Ipv6Addr) -> bool {
        let Some(i) = self.index_of(addr) else {
            return false;
        };
        let Some(entry) = self.slots[i].as_mut() else {
            return false;
        };
        if entry.state != AddressState::Tentative {
            return false;
        }

        warn!(addr = %addr, permanent = entry.permanent, "Duplicate address detected");
        entry.duplicate = true;
        entry.state = AddressState::Invalid;
        if !entry.permanent {
            self.slots[i] = None;
        }
        true
    }

    /// Restart DAD on every non-duplicate address (link came up)
    pub fn restart_dad(&mut self, mut initial_delay: impl FnMut() -> u32, dad_transmits: u8) {
        for entry in self.slots.iter_mut().flatten() {
            if entry.duplicate {
                continue;
            }
            entry.begin_dad(initial_delay(), dad_transmits);
        }
    }

    /// Link went down: drop learned addresses, put permanent ones back to
    /// Tentative until DAD runs again
    pub fn link_down(&mut self) {
        for slot in self.slots.iter_mut() {
            let Some(entry) = slot.as_mut() else {
                continue;
            };
            if !entry.permanent {
                *slot = None;
            } else if !entry.duplicate {
                entry.state = AddressState::Tentative;
                entry.dad_retransmit_count = 0;
                entry.dad_timeout = 0;
            }
        }
    }

    /// Advance DAD and lifetimes by `elapsed` ms
    pub fn tick(
        &mut self,
        elapsed: u32,
        retrans_timer: u32,
        dad_transmits: u8,
        run_dad: bool,
    ) -> Vec<AddressTimerEvent> {
        let mut events = Vec::new();

        for slot in self.slots.iter_mut() {
            let Some(entry) = slot.as_mut() else {
                continue;
            };

            if entry.state == AddressState::Tentative && run_dad {
                entry.dad_timeout = entry.dad_timeout.saturating_sub(elapsed);
                if entry.dad_timeout == 0 {
                    if entry.dad_retransmit_count >= dad_transmits {
                        entry.state = entry.settled_state();
                        info!(addr = %entry.addr, state = ?entry.state, "DAD completed");
                        events.push(AddressTimerEvent::StateChanged {
                            addr: entry.addr,
                            state: entry.state,
                        });
                    } else {
                        entry.dad_retransmit_count += 1;
                        entry.dad_timeout = retrans_timer;
                        events.push(AddressTimerEvent::SendDadSolicitation(entry.addr));
                    }
                }
            }

            if entry.permanent || entry.state == AddressState::Invalid {
                continue;
            }

            entry.valid_lifetime = age_lifetime(entry.valid_lifetime, elapsed);
            entry.preferred_lifetime = age_lifetime(entry.preferred_lifetime, elapsed);

            if entry.valid_lifetime == 0 {
                debug!(addr = %entry.addr, "Address valid lifetime expired");
                events.push(AddressTimerEvent::StateChanged {
                    addr: entry.addr,
                    state: AddressState::Invalid,
                });
                *slot = None;
            } else if entry.preferred_lifetime == 0 && entry.state == AddressState::Preferred {
                entry.state = AddressState::Deprecated;
                debug!(addr = %entry.addr, "Address deprecated");
                events.push(AddressTimerEvent::StateChanged {
                    addr: entry.addr,
                    state: AddressState::Deprecated,
                });
            }
        }

        events
    }
}
