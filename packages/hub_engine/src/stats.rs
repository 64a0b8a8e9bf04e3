//! Counters shared by a registry and every hub it creates.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HubStats {
    // Hub lifecycle
    pub hubs_created: AtomicU64,
    pub hubs_removed: AtomicU64,

    // Membership
    pub connections_joined: AtomicU64,
    pub connections_left: AtomicU64,
    /// Connections dropped because their outbound queue was full
    pub implied_disconnects: AtomicU64,

    // Fan-out
    /// Completed `bcast` rounds
    pub broadcasts: AtomicU64,
    /// Individual per-member send attempts
    pub send_attempts: AtomicU64,

    // Informational notices
    /// Notice pairs parked on the low-priority queue
    pub notices_deferred: AtomicU64,
    /// Notice pairs lost because both queues were full
    pub notices_dropped: AtomicU64,
}

impl HubStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn hub_created(&self) {
        self.hubs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hub_removed(&self) {
        self.hubs_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_joined(&self) {
        self.connections_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_left(&self) {
        self.connections_left.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn implied_disconnect(&self) {
        self.implied_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn broadcast_dispatched(&self, sends: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.send_attempts.fetch_add(sends as u64, Ordering::Relaxed);
    }

    pub(crate) fn notice_deferred(&self) {
        self.notices_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn notice_dropped(&self) {
        self.notices_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hubs_created: self.hubs_created.load(Ordering::Relaxed),
            hubs_removed: self.hubs_removed.load(Ordering::Relaxed),
            connections_joined: self.connections_joined.load(Ordering::Relaxed),
            connections_left: self.connections_left.load(Ordering::Relaxed),
            implied_disconnects: self.implied_disconnects.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            send_attempts: self.send_attempts.load(Ordering::Relaxed),
            notices_deferred: self.notices_deferred.load(Ordering::Relaxed),
            notices_dropped: self.notices_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub hubs_created: u64,
    pub hubs_removed: u64,
    pub connections_joined: u64,
    pub connections_left: u64,
    pub implied_disconnects: u64,
    pub broadcasts: u64,
    pub send_attempts: u64,
    pub notices_deferred: u64,
    pub notices_dropped: u64,
}
