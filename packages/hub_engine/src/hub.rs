//! A hub is one room's broadcast domain.
//!
//! All membership decisions and every fan-out go through a single dispatch
//! loop. Membership changes and broadcasts are therefore totally ordered per
//! room: a broadcast is delivered to the member snapshot taken when it starts,
//! and the loop does not move on until every member's send has reported back.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::connection::{Completion, Connection, ConnectionId};
use crate::error::HubError;
use crate::frame::Payload;
use crate::registry::RegistryShared;
use crate::stats::HubStats;

/// tokio channels cannot be zero-sized; one slot keeps join/leave requests
/// effectively hand-to-hand with the dispatch loop.
const MEMBERSHIP_QUEUE_CAPACITY: usize = 1;

struct Registration {
    conn: Arc<Connection>,
    accepted: oneshot::Sender<bool>,
}

/// Join/leave announcements travel as a pair so their relative order holds.
#[derive(Debug)]
struct Notice {
    lines: Vec<Payload>,
}

struct Members {
    conns: HashMap<ConnectionId, Arc<Connection>>,
    /// Set under the registry lock when the hub is torn down; later
    /// registrations are refused.
    closed: bool,
}

/// Receiving ends of the hub's queues, owned by the dispatch loop.
struct Inbox {
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<Arc<Connection>>,
    broadcast_rx: mpsc::Receiver<Payload>,
    notice_rx: mpsc::Receiver<Notice>,
}

pub struct Hub {
    id: String,
    members: RwLock<Members>,
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Arc<Connection>>,
    broadcast_tx: mpsc::Sender<Payload>,
    /// Low-priority path for notices that do not fit the broadcast queue
    notice_tx: mpsc::Sender<Notice>,
    shutdown: CancellationToken,
    registry: Weak<RegistryShared>,
    stats: Arc<HubStats>,
}

impl Hub {
    fn new(
        id: String,
        config: &HubConfig,
        registry: Weak<RegistryShared>,
        stats: Arc<HubStats>,
    ) -> (Arc<Self>, Inbox) {
        let (register_tx, register_rx) = mpsc::channel(MEMBERSHIP_QUEUE_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(MEMBERSHIP_QUEUE_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_queue_capacity.max(1));
        let (notice_tx, notice_rx) = mpsc::channel(config.notice_queue_capacity.max(1));

        let hub = Arc::new(Self {
            id,
            members: RwLock::new(Members {
                conns: HashMap::new(),
                closed: false,
            }),
            register_tx,
            unregister_tx,
            broadcast_tx,
            notice_tx,
            shutdown: CancellationToken::new(),
            registry,
            stats,
        });
        let inbox = Inbox {
            register_rx,
            unregister_rx,
            broadcast_rx,
            notice_rx,
        };
        (hub, inbox)
    }

    /// Create a hub and start its dispatch loop.
    pub(crate) fn spawn(
        id: String,
        config: &HubConfig,
        registry: Weak<RegistryShared>,
        stats: Arc<HubStats>,
    ) -> Arc<Self> {
        let (hub, inbox) = Self::new(id, config, registry, stats);
        tokio::spawn(hub.clone().run(inbox));
        hub
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn stats(&self) -> &HubStats {
        &self.stats
    }

    /// True once the hub has been torn down
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.conns.len()
    }

    pub async fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.read().await.conns.keys().copied().collect()
    }

    /// Ask the dispatch loop to add `conn`. Fails if the hub has been torn
    /// down; callers should then look the room up again.
    pub async fn register(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        let (accepted, ack) = oneshot::channel();
        self.register_tx
            .send(Registration { conn, accepted })
            .await
            .map_err(|_| self.closed_error())?;
        match ack.await {
            Ok(true) => Ok(()),
            _ => Err(self.closed_error()),
        }
    }

    /// Ask the dispatch loop to remove `conn`. Waits until the loop takes the
    /// request; removal itself happens asynchronously.
    pub async fn unregister(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        self.unregister_tx
            .send(conn)
            .await
            .map_err(|_| self.closed_error())
    }

    /// Queue a payload for every member. Waits while the broadcast queue is
    /// full.
    pub async fn broadcast(&self, payload: Payload) -> Result<(), HubError> {
        self.broadcast_tx
            .send(payload)
            .await
            .map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> HubError {
        HubError::Closed(self.id.clone())
    }

    async fn run(self: Arc<Self>, mut inbox: Inbox) {
        debug!(hub = %self.id, "Dispatch loop started");

        loop {
            // Polled in order: deferred notices only run when nothing else is ready
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(registration) = inbox.register_rx.recv() => self.connect(registration).await,
                Some(conn) = inbox.unregister_rx.recv() => self.disconnect(conn).await,
                Some(payload) = inbox.broadcast_rx.recv() => self.bcast(payload).await,
                Some(notice) = inbox.notice_rx.recv() => {
                    for line in notice.lines {
                        self.bcast(line).await;
                    }
                }
            }
        }

        debug!(hub = %self.id, "Dispatch loop stopped");
    }

    async fn connect(self: &Arc<Self>, registration: Registration) {
        let Registration { conn, accepted } = registration;

        let count = {
            let mut members = self.members.write().await;
            if members.closed {
                let _ = accepted.send(false);
                return;
            }
            members.conns.insert(conn.id(), conn.clone());
            members.conns.len()
        };
        let _ = accepted.send(true);

        self.stats.connection_joined();
        info!(hub = %self.id, conn = %conn.id(), members = count, "Connection joined");

        self.post_notice([
            format!("{} connected", conn.id()),
            format!("{} clients currently connected to hub {}", count, self.id),
        ]);
    }

    async fn disconnect(self: &Arc<Self>, conn: Arc<Connection>) {
        let (removed, count) = {
            let mut members = self.members.write().await;
            let removed = members.conns.remove(&conn.id()).is_some();
            (removed, members.conns.len())
        };

        conn.mark_dead().await;

        if !removed {
            debug!(hub = %self.id, conn = %conn.id(), "Ignoring unregister for non-member");
            return;
        }

        self.stats.connection_left();
        info!(hub = %self.id, conn = %conn.id(), members = count, "Connection left");

        if count > 0 {
            self.post_notice([
                format!("{} disconnected", conn.id()),
                format!("{} clients currently connected to hub {}", count, self.id),
            ]);
        } else {
            // Teardown takes the registry lock, which a BroadcastAll may hold
            // while it waits on this hub's queue.
            tokio::spawn(self.clone().teardown());
        }
    }

    /// Fan a payload out to the current members, one task per member, and
    /// wait for every one of them to report completion.
    async fn bcast(self: &Arc<Self>, payload: Payload) {
        let members = self.members.read().await;
        let launched = members.conns.len();
        if launched == 0 {
            return;
        }

        let (done_tx, mut done_rx) = mpsc::channel(launched);
        for conn in members.conns.values() {
            tokio::spawn(conn.clone().send(
                payload.clone(),
                Completion::new(done_tx.clone()),
                self.clone(),
            ));
        }
        drop(members);
        drop(done_tx);

        let mut pending = launched;
        while pending > 0 && done_rx.recv().await.is_some() {
            pending -= 1;
        }

        self.stats.broadcast_dispatched(launched);
    }

    /// Post an informational pair without ever waiting on the broadcast
    /// queue: the dispatch loop is the queue's only consumer and would
    /// deadlock against itself.
    fn post_notice(&self, lines: [String; 2]) {
        let lines: Vec<Payload> = lines.into_iter().map(Payload::from).collect();

        match self.broadcast_tx.try_reserve_many(lines.len()) {
            Ok(permits) => {
                for (permit, line) in permits.zip(lines) {
                    permit.send(line);
                }
            }
            Err(_) => match self.notice_tx.try_send(Notice { lines }) {
                Ok(()) => {
                    self.stats.notice_deferred();
                    debug!(hub = %self.id, "Broadcast queue full, notice deferred");
                }
                Err(_) => {
                    self.stats.notice_dropped();
                    warn!(hub = %self.id, "Broadcast and notice queues full, notice dropped");
                }
            },
        }
    }

    /// Remove this hub from the registry if it is still empty.
    ///
    /// The emptiness check, the closed mark and the map removal all happen
    /// under the registry's write lock, so a concurrent `get_or_create` sees
    /// either the live hub or no hub, and a registration racing the teardown
    /// is either counted by the check or refused afterwards.
    pub(crate) async fn teardown(self: Arc<Self>) {
        let Some(registry) = self.registry.upgrade() else {
            self.close_members().await;
            return;
        };

        let mut hubs = registry.hubs.write().await;
        {
            let mut members = self.members.write().await;
            if !members.conns.is_empty() {
                debug!(hub = %self.id, "Hub repopulated, keeping it");
                return;
            }
            members.closed = true;
        }

        if hubs
            .get(&self.id)
            .is_some_and(|existing| Arc::ptr_eq(existing, &self))
        {
            hubs.remove(&self.id);
            self.stats.hub_removed();
        }
        self.shutdown.cancel();
        drop(hubs);

        info!(hub = %self.id, "Hub removed");
    }

    /// Refuse new members, kill every current one and stop the loop.
    /// Used at process shutdown.
    pub(crate) async fn close_members(&self) {
        let conns: Vec<Arc<Connection>> = {
            let mut members = self.members.write().await;
            members.closed = true;
            members.conns.drain().map(|(_, conn)| conn).collect()
        };
        for conn in conns {
            conn.mark_dead().await;
        }
        self.shutdown.cancel();
    }
}
