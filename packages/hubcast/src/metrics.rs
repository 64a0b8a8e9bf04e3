//! Server metrics for observability
//!
//! Session-level counters kept by the HTTP layer. Room and fan-out counters
//! live in the engine and are reported alongside these.

use hub_engine::StatsSnapshot;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Session metrics
    /// Currently open websocket sessions
    pub active_sessions: AtomicU64,
    /// Sessions opened since server start
    pub total_sessions: AtomicU64,
    /// Upgrades that could not join their room
    pub rejected_sessions: AtomicU64,

    // Request metrics
    /// Upgrade requests refused for a malformed room id
    pub invalid_room_ids: AtomicU64,
    /// Server-wide broadcasts posted through the HTTP API
    pub admin_broadcasts: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn session_rejected(&self) {
        self.rejected_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_room_id(&self) {
        self.invalid_room_ids.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admin_broadcast(&self) {
        self.admin_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            sessions: SessionMetrics {
                active: self.active_sessions.load(Ordering::Relaxed),
                total: self.total_sessions.load(Ordering::Relaxed),
                rejected: self.rejected_sessions.load(Ordering::Relaxed),
            },
            requests: RequestMetrics {
                invalid_room_ids: self.invalid_room_ids.load(Ordering::Relaxed),
                admin_broadcasts: self.admin_broadcasts.load(Ordering::Relaxed),
            },
        }
    }
}

/// Snapshot of server metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub sessions: SessionMetrics,
    pub requests: RequestMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    pub active: u64,
    pub total: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    pub invalid_room_ids: u64,
    pub admin_broadcasts: u64,
}

/// Body of `GET /metrics`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub server: MetricsSnapshot,
    pub hubs: StatsSnapshot,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub rooms: usize,
    pub sessions: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let metrics = ServerMetrics::new();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();
        metrics.session_rejected();

        let snap = metrics.snapshot();
        assert_eq!(snap.sessions.active, 1);
        assert_eq!(snap.sessions.total, 2);
        assert_eq!(snap.sessions.rejected, 1);
    }

    #[test]
    fn test_default_has_no_uptime() {
        let metrics = ServerMetrics::default();
        assert_eq!(metrics.uptime_secs(), 0);
    }
}
