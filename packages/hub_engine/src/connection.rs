//! One client session: an outbound queue, a liveness flag and the
//! reader/writer loops that move frames between the transport and a hub.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use crate::frame::{Frame, FrameSink, FrameSource, OpCode, Payload};
use crate::hub::Hub;

/// Unique identifier for a client connection
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0.simple())
    }
}

/// What happened to a single fan-out delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Payload is in the outbound queue
    Queued,
    /// Connection was already dead; nothing was queued
    Dead,
    /// Queue was saturated; the connection is being unregistered
    Evicted,
}

/// Liveness flag and outbound queue live under one lock so that
/// "check dead, then enqueue" and "mark dead, then close" never interleave.
pub(crate) struct Link {
    dead: bool,
    /// Set by the first send that finds the queue saturated, so racing
    /// sends issue a single unregister request between them.
    evicting: bool,
    /// Dropping the sender closes the queue.
    outbound: Option<mpsc::Sender<Payload>>,
}

pub struct Connection {
    id: ConnectionId,
    link: RwLock<Link>,
    /// Cancelling this closes the transport: the reader abandons its read.
    closed: CancellationToken,
}

/// Consumer end of a connection's outbound queue, owned by its writer.
pub struct Outbound {
    rx: mpsc::Receiver<Payload>,
}

impl Outbound {
    /// Next queued payload, or `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }
}

/// Completion signal for one fan-out send. Fires when dropped, so every
/// exit path of `Connection::send` reports back to the dispatch loop.
pub(crate) struct Completion(mpsc::Sender<()>);

impl Completion {
    pub(crate) fn new(tx: mpsc::Sender<()>) -> Self {
        Self(tx)
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

impl Connection {
    /// Create a live connection whose outbound queue holds `outbound_capacity`
    /// payloads. The returned `Outbound` must be handed to `write_loop`.
    pub fn new(outbound_capacity: usize) -> (Arc<Self>, Outbound) {
        let (tx, rx) = mpsc::channel(outbound_capacity.max(1));
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            link: RwLock::new(Link {
                dead: false,
                evicting: false,
                outbound: Some(tx),
            }),
            closed: CancellationToken::new(),
        });
        (conn, Outbound { rx })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn is_dead(&self) -> bool {
        self.link.read().await.dead
    }

    /// Whether the transport handle has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Deliver one broadcast payload without ever blocking on the client.
    ///
    /// A saturated queue is an implied disconnect: the connection asks `hub`
    /// to unregister it. `done` fires on every path.
    pub(crate) async fn send(
        self: Arc<Self>,
        payload: Payload,
        done: Completion,
        hub: Arc<Hub>,
    ) -> SendOutcome {
        if self.link.read().await.dead {
            return SendOutcome::Dead;
        }

        let rejected = {
            let mut link = self.link.write().await;
            let attempt = match link.outbound.as_ref() {
                Some(tx) if !link.dead => tx.try_send(payload),
                _ => return SendOutcome::Dead,
            };
            match attempt {
                Ok(()) => return SendOutcome::Queued,
                Err(_) if link.evicting => return SendOutcome::Evicted,
                Err(err) => {
                    link.evicting = true;
                    err
                }
            }
        };

        let reason = match rejected {
            TrySendError::Full(_) => "outbound queue full",
            TrySendError::Closed(_) => "writer gone",
        };

        // The dispatch loop is parked on our completion and cannot take the
        // unregister request until it is released.
        drop(done);

        hub.stats().implied_disconnect();
        warn!(conn = %self.id, hub = %hub.id(), reason, "Implied disconnect");

        if hub.unregister(self.clone()).await.is_err() {
            self.mark_dead().await;
        }
        SendOutcome::Evicted
    }

    /// Transition to dead: close the outbound queue and the transport.
    /// Returns false if the connection was already dead.
    pub(crate) async fn mark_dead(&self) -> bool {
        let mut link = self.link.write().await;
        if link.dead {
            return false;
        }
        link.dead = true;
        link.outbound = None;
        self.closed.cancel();
        true
    }

    /// Pump text frames from the transport into `hub`'s broadcast queue.
    ///
    /// Every received frame pushes the read deadline out again. Submission
    /// to the hub blocks while its broadcast queue is full, which stalls
    /// this loop in turn. Returns once the connection is closed, the peer
    /// sends Close, or a read fails.
    pub async fn read_loop<S: FrameSource>(
        self: Arc<Self>,
        mut source: S,
        hub: Arc<Hub>,
        config: ConnectionConfig,
    ) -> Result<(), ConnectionError> {
        let mut deadline = Instant::now() + config.read_deadline;

        loop {
            let frame = tokio::select! {
                _ = self.closed.cancelled() => return Ok(()),
                read = tokio::time::timeout_at(deadline, source.read_frame()) => match read {
                    Ok(Ok(frame)) => frame,
                    Ok(Err(e)) => return Err(ConnectionError::Read(e)),
                    Err(_) => return Err(ConnectionError::ReadTimeout(config.read_deadline)),
                },
            };
            deadline = Instant::now() + config.read_deadline;

            match frame.op {
                OpCode::Text => {
                    let size = frame.payload.len();
                    if size > config.max_message_size {
                        return Err(ConnectionError::MessageTooLarge {
                            size,
                            limit: config.max_message_size,
                        });
                    }
                    tokio::select! {
                        _ = self.closed.cancelled() => return Ok(()),
                        submitted = hub.broadcast(frame.payload) => submitted?,
                    }
                }
                OpCode::Pong => trace!(conn = %self.id, "pong"),
                OpCode::Close => {
                    debug!(conn = %self.id, "Peer sent close");
                    return Ok(());
                }
                OpCode::Ping | OpCode::Binary => {}
            }
        }
    }

    /// Drain the outbound queue onto the transport, and send a ping every
    /// `ping_period` whether or not payloads are flowing.
    ///
    /// Writes a Close frame and returns once the queue is closed; any
    /// write failure ends the loop immediately.
    pub async fn write_loop<K: FrameSink>(
        self: Arc<Self>,
        mut sink: K,
        mut outbound: Outbound,
        config: ConnectionConfig,
    ) -> Result<(), ConnectionError> {
        let mut ping = tokio::time::interval_at(
            Instant::now() + config.ping_period,
            config.ping_period,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = outbound.recv() => match next {
                    Some(payload) => {
                        write_within(&mut sink, Frame::text(payload), config.write_deadline).await?;
                    }
                    None => {
                        debug!(conn = %self.id, "Outbound queue closed");
                        let _ = write_within(&mut sink, Frame::close(), config.write_deadline).await;
                        return Ok(());
                    }
                },
                _ = ping.tick() => {
                    write_within(&mut sink, Frame::ping(), config.write_deadline).await?;
                }
            }
        }
    }
}

#[cfg(test)]
impl Connection {
    /// Hold the per-connection lock; sends stall until the guard drops.
    pub(crate) async fn stall_sends(&self) -> tokio::sync::RwLockWriteGuard<'_, Link> {
        self.link.write().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_within<K: FrameSink>(
    sink: &mut K,
    frame: Frame,
    limit: Duration,
) -> Result<(), ConnectionError> {
    match tokio::time::timeout(limit, sink.write_frame(frame)).await {
        Ok(result) => result.map_err(ConnectionError::Write),
        Err(_) => Err(ConnectionError::WriteTimeout(limit)),
    }
}
