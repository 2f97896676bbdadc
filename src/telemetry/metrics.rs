//! Neighbor Discovery counters.
//!
//! Thread-safe counters for NDP message processing, tracked globally and
//! per interface. Shared between interface contexts through an `Arc`.

use crate::protocol::icmpv6::Icmpv6Type;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface NDP statistics.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    /// NDP messages accepted.
    pub rx_messages: Counter,
    /// Bytes of accepted NDP messages.
    pub rx_bytes: Counter,
    /// NDP messages handed to the link layer.
    pub tx_messages: Counter,
    /// Bytes of transmitted NDP messages.
    pub tx_bytes: Counter,
    /// Messages dropped by validation.
    pub rx_drops: Counter,
}

impl InterfaceStats {
    /// Creates new interface statistics initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rx(&self, bytes: usize) {
        self.rx_messages.inc();
        self.rx_bytes.add(bytes as u64);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_messages.inc();
        self.tx_bytes.add(bytes as u64);
    }

    pub fn record_rx_drop(&self) {
        self.rx_drops.inc();
    }
}

/// Table occupancy gauges of one interface
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableSizes {
    pub neighbors: usize,
    pub destinations: usize,
    pub prefixes: usize,
    pub routers: usize,
    pub addresses: usize,
}

/// NDP metrics registry.
#[derive(Debug, Default)]
pub struct NdpMetrics {
    interfaces: RwLock<HashMap<String, InterfaceStats>>,

    // Transmit
    pub rs_sent: Counter,
    pub ra_sent: Counter,
    pub ns_sent: Counter,
    pub na_sent: Counter,
    pub redirect_sent: Counter,

    // Receive
    pub rs_received: Counter,
    pub ra_received: Counter,
    pub ns_received: Counter,
    pub na_received: Counter,
    pub redirect_received: Counter,
    /// Messages that failed validation.
    pub messages_dropped: Counter,

    // Neighbor Cache
    /// Packets dropped from full pending queues.
    pub queue_drops: Counter,
    /// Neighbors declared unreachable.
    pub resolution_failures: Counter,
    /// Entries recycled to make room.
    pub neighbor_evictions: Counter,

    // DAD
    pub dad_conflicts: Counter,

    // Table size gauges, summed over interfaces
    pub neighbor_cache_size: AtomicU64,
    pub destination_cache_size: AtomicU64,
    pub prefix_count: AtomicU64,
    pub router_count: AtomicU64,
}

impl NdpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn interfaces(&self) -> RwLockReadGuard<'_, HashMap<String, InterfaceStats>> {
        self.interfaces.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an interface for statistics tracking.
    pub fn register_interface(&self, name: &str) {
        let mut interfaces = self.interfaces.write().unwrap_or_else(|e| e.into_inner());
        interfaces.entry(name.to_string()).or_default();
    }

    /// Records an accepted NDP message.
    pub fn record_rx(&self, interface: &str, msg_type: Icmpv6Type, bytes: usize) {
        match msg_type {
            Icmpv6Type::RouterSolicitation => self.rs_received.inc(),
            Icmpv6Type::RouterAdvertisement => self.ra_received.inc(),
            Icmpv6Type::NeighborSolicitation => self.ns_received.inc(),
            Icmpv6Type::NeighborAdvertisement => self.na_received.inc(),
            Icmpv6Type::Redirect => self.redirect_received.inc(),
            _ => {}
        }
        if let Some(stats) = self.interfaces().get(interface) {
            stats.record_rx(bytes);
        }
    }

    /// Records an NDP message handed to the link layer.
    pub fn record_tx(&self, interface: &str, msg_type: Icmpv6Type, bytes: usize) {
        match msg_type {
            Icmpv6Type::RouterSolicitation => self.rs_sent.inc(),
            Icmpv6Type::RouterAdvertisement => self.ra_sent.inc(),
            Icmpv6Type::NeighborSolicitation => self.ns_sent.inc(),
            Icmpv6Type::NeighborAdvertisement => self.na_sent.inc(),
            Icmpv6Type::Redirect => self.redirect_sent.inc(),
            _ => {}
        }
        if let Some(stats) = self.interfaces().get(interface) {
            stats.record_tx(bytes);
        }
    }

    /// Records a message dropped by validation.
    pub fn record_drop(&self, interface: &str) {
        self.messages_dropped.inc();
        if let Some(stats) = self.interfaces().get(interface) {
            stats.record_rx_drop();
        }
    }

    /// Updates the table size gauges.
    pub fn set_table_sizes(&self, sizes: TableSizes) {
        self.neighbor_cache_size
            .store(sizes.neighbors as u64, Ordering::Relaxed);
        self.destination_cache_size
            .store(sizes.destinations as u64, Ordering::Relaxed);
        self.prefix_count
            .store(sizes.prefixes as u64, Ordering::Relaxed);
        self.router_count.store(sizes.routers as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("rs_sent".into(), self.rs_sent.get()),
            ("ra_sent".into(), self.ra_sent.get()),
            ("ns_sent".into(), self.ns_sent.get()),
            ("na_sent".into(), self.na_sent.get()),
            ("redirect_sent".into(), self.redirect_sent.get()),
            ("rs_received".into(), self.rs_received.get()),
            ("ra_received".into(), self.ra_received.get()),
            ("ns_received".into(), self.ns_received.get()),
            ("na_received".into(), self.na_received.get()),
            ("redirect_received".into(), self.redirect_received.get()),
            ("messages_dropped".into(), self.messages_dropped.get()),
            ("queue_drops".into(), self.queue_drops.get()),
            ("resolution_failures".into(), self.resolution_failures.get()),
            ("neighbor_evictions".into(), self.neighbor_evictions.get()),
            ("dad_conflicts".into(), self.dad_conflicts.get()),
            (
                "neighbor_cache_size".into(),
                self.neighbor_cache_size.load(Ordering::Relaxed),
            ),
            (
                "destination_cache_size".into(),
                self.destination_cache_size.load(Ordering::Relaxed),
            ),
            (
                "prefix_count".into(),
                self.prefix_count.load(Ordering::Relaxed),
            ),
            (
                "router_count".into(),
                self.router_count.load(Ordering::Relaxed),
            ),
        ];

        for (name, stats) in self.interfaces().iter() {
            result.extend([
                (format!("{}_rx_messages", name), stats.rx_messages.get()),
                (format!("{}_rx_bytes", name), stats.rx_bytes.get()),
                (format!("{}_tx_messages", name), stats.tx_messages.get()),
                (format!("{}_tx_bytes", name), stats.tx_bytes.get()),
                (format!("{}_rx_drops", name), stats.rx_drops.get()),
            ]);
        }

        result
    }
}
