use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::HubConfig;
use crate::connection::Connection;
use crate::error::HubError;
use crate::frame::Payload;
use crate::hub::Hub;
use crate::stats::{HubStats, StatsSnapshot};

/// A registration can lose a race against the teardown of the hub it looked
/// up; a fresh lookup then finds or creates the replacement.
const JOIN_ATTEMPTS: usize = 3;

pub(crate) struct RegistryShared {
    pub(crate) hubs: RwLock<HashMap<String, Arc<Hub>>>,
    config: HubConfig,
    stats: Arc<HubStats>,
}

/// Room id to hub mapping with create-on-demand and empty-room teardown.
///
/// Cheap to clone; every clone refers to the same set of hubs. Construct one
/// at startup and hand it to whatever accepts connections.
#[derive(Clone)]
pub struct HubRegistry {
    shared: Arc<RegistryShared>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub members: usize,
}

impl HubRegistry {
    pub fn new(config: HubConfig) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                hubs: RwLock::new(HashMap::new()),
                config,
                stats: Arc::new(HubStats::new()),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Return the hub for `id`, creating it (and starting its dispatch loop)
    /// if there is none. Lookup and creation share one exclusive section.
    pub async fn get_or_create(&self, id: &str) -> Arc<Hub> {
        let mut hubs = self.shared.hubs.write().await;
        if let Some(hub) = hubs.get(id) {
            return hub.clone();
        }

        let hub = Hub::spawn(
            id.to_string(),
            &self.shared.config,
            Arc::downgrade(&self.shared),
            self.shared.stats.clone(),
        );
        hubs.insert(id.to_string(), hub.clone());
        self.shared.stats.hub_created();
        info!(hub = %id, "Hub created");
        hub
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Hub>> {
        self.shared.hubs.read().await.get(id).cloned()
    }

    /// Look up (or create) the room and register `conn` with it.
    pub async fn join(&self, id: &str, conn: Arc<Connection>) -> Result<Arc<Hub>, HubError> {
        for attempt in 1..=JOIN_ATTEMPTS {
            let hub = self.get_or_create(id).await;
            match hub.register(conn.clone()).await {
                Ok(()) => return Ok(hub),
                Err(e) => {
                    debug!(hub = %id, conn = %conn.id(), attempt, "Join raced a teardown: {}", e)
                }
            }
        }
        Err(HubError::Closed(id.to_string()))
    }

    /// Queue `payload` on every hub's broadcast queue.
    ///
    /// The registry stays exclusively locked throughout, and each enqueue
    /// waits for space: one saturated room stalls delivery to all rooms after
    /// it and blocks room creation until it drains. Returns how many hubs
    /// accepted the payload.
    pub async fn broadcast_all(&self, payload: Payload) -> usize {
        let hubs = self.shared.hubs.write().await;
        let mut delivered = 0;
        for hub in hubs.values() {
            if hub.broadcast(payload.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Summaries of every live room, sorted by id
    pub async fn rooms(&self) -> Vec<RoomSummary> {
        let hubs = self.shared.hubs.read().await;
        let mut rooms = Vec::with_capacity(hubs.len());
        for (id, hub) in hubs.iter() {
            rooms.push(RoomSummary {
                id: id.clone(),
                members: hub.member_count().await,
            });
        }
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    pub async fn len(&self) -> usize {
        self.shared.hubs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.hubs.read().await.is_empty()
    }

    /// Tear down every hub: members are marked dead (closing their queues
    /// and transports) and dispatch loops stop.
    pub async fn shutdown(&self) {
        let hubs: Vec<Arc<Hub>> = {
            let mut hubs = self.shared.hubs.write().await;
            hubs.drain().map(|(_, hub)| hub).collect()
        };

        info!(hubs = hubs.len(), "Shutting down hub registry");
        for hub in hubs {
            hub.close_members().await;
            self.shared.stats.hub_removed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::recv_until;
    use bytes::Bytes;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let registry = HubRegistry::new(HubConfig::default());

        let first = registry.get_or_create("r1").await;
        let second = registry.get_or_create("r1").await;
        let other = registry.get_or_create("r2").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_lookups_create_a_single_hub() {
        let registry = HubRegistry::new(HubConfig::default());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(
                async move { registry.get_or_create("busy").await },
            ));
        }
        let mut hubs = Vec::new();
        for task in tasks {
            hubs.push(task.await.unwrap());
        }

        assert!(hubs.iter().all(|hub| Arc::ptr_eq(hub, &hubs[0])));
        assert_eq!(registry.stats().hubs_created, 1);
    }

    #[tokio::test]
    async fn broadcast_all_reaches_every_room() {
        let registry = HubRegistry::new(HubConfig::default());
        let (a, mut a_out) = Connection::new(16);
        let (b, mut b_out) = Connection::new(16);
        registry.join("r1", a).await.unwrap();
        registry.join("r2", b).await.unwrap();

        let delivered = registry
            .broadcast_all(Bytes::from_static(b"maintenance at noon"))
            .await;

        assert_eq!(delivered, 2);
        recv_until(&mut a_out, "maintenance at noon").await;
        recv_until(&mut b_out, "maintenance at noon").await;
    }

    #[tokio::test]
    async fn join_after_teardown_lands_in_a_fresh_hub() {
        let registry = HubRegistry::new(HubConfig::default());
        let stale = registry.get_or_create("r1").await;
        stale.clone().teardown().await;

        let (a, _a_out) = Connection::new(16);
        let hub = registry.join("r1", a.clone()).await.unwrap();

        assert!(!Arc::ptr_eq(&stale, &hub));
        assert_eq!(hub.member_ids().await, vec![a.id()]);
        assert_eq!(registry.stats().hubs_removed, 1);
    }

    #[tokio::test]
    async fn rooms_are_listed_sorted_with_member_counts() {
        let registry = HubRegistry::new(HubConfig::default());
        let (a, _a_out) = Connection::new(16);
        let (b, _b_out) = Connection::new(16);
        registry.join("zeta", a).await.unwrap();
        registry.join("alpha", b).await.unwrap();
        registry.get_or_create("empty").await;

        let rooms = registry.rooms().await;

        assert_eq!(
            rooms,
            vec![
                RoomSummary {
                    id: "alpha".into(),
                    members: 1
                },
                RoomSummary {
                    id: "empty".into(),
                    members: 0
                },
                RoomSummary {
                    id: "zeta".into(),
                    members: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_kills_members_and_empties_registry() {
        let registry = HubRegistry::new(HubConfig::default());
        let (a, _a_out) = Connection::new(16);
        let hub = registry.join("r1", a.clone()).await.unwrap();

        registry.shutdown().await;

        assert!(registry.is_empty().await);
        assert!(a.is_dead().await);
        assert!(a.is_closed());
        assert!(hub.is_closed());
        let (b, _b_out) = Connection::new(16);
        assert!(hub.register(b).await.is_err());
    }
}
