//! In-memory transports and polling helpers shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc};

use crate::connection::{Connection, Outbound};
use crate::error::TransportError;
use crate::frame::{Frame, FrameSink, FrameSource, OpCode};
use crate::hub::Hub;
use crate::registry::HubRegistry;

const WAIT_LIMIT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(crate) struct MockSource {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

impl FrameSource for MockSource {
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        self.inbound
            .recv()
            .await
            .unwrap_or(Err(TransportError::Closed))
    }
}

pub(crate) struct MockSink {
    written: mpsc::UnboundedSender<Frame>,
    fail: Arc<AtomicBool>,
    gate: Arc<RwLock<()>>,
}

impl FrameSink for MockSink {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let _open = self.gate.read().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Io("mock write failure".to_string()));
        }
        self.written.send(frame).map_err(|_| TransportError::Closed)
    }
}

/// The far end of a mock transport: feeds frames to the reader and
/// observes what the writer put on the wire.
pub(crate) struct MockPeer {
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    written: mpsc::UnboundedReceiver<Frame>,
    fail: Arc<AtomicBool>,
    gate: Arc<RwLock<()>>,
}

impl MockPeer {
    pub(crate) fn push(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(frame));
    }

    pub(crate) fn hang_up(&self) {
        let _ = self.inbound.send(Err(TransportError::Closed));
    }

    pub(crate) fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Block every write until the returned guard drops
    pub(crate) async fn stall_writes(&self) -> OwnedRwLockWriteGuard<()> {
        self.gate.clone().write_owned().await
    }

    pub(crate) async fn next_written(&mut self) -> Option<Frame> {
        self.written.recv().await
    }

    /// Skip written frames until a text frame carrying `text` shows up.
    pub(crate) async fn expect_text(&mut self, text: &str) {
        let wanted = Frame::text(text.to_string());
        tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                match self.written.recv().await {
                    Some(frame) if frame == wanted => return,
                    Some(_) => continue,
                    None => panic!("sink closed before {text:?} was written"),
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {text:?} on the wire"));
    }

    /// Wait for the writer's Close frame, skipping anything queued before it.
    pub(crate) async fn expect_close(&mut self) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while let Some(frame) = self.written.recv().await {
                if frame.op == OpCode::Close {
                    return;
                }
            }
            panic!("sink closed without a close frame");
        })
        .await
        .expect("timed out waiting for a close frame");
    }
}

pub(crate) fn mock_transport() -> (MockSource, MockSink, MockPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let fail = Arc::new(AtomicBool::new(false));
    let gate = Arc::new(RwLock::new(()));

    (
        MockSource {
            inbound: inbound_rx,
        },
        MockSink {
            written: written_tx,
            fail: fail.clone(),
            gate: gate.clone(),
        },
        MockPeer {
            inbound: inbound_tx,
            written: written_rx,
            fail,
            gate,
        },
    )
}

/// Drain `outbound` until `text` arrives.
pub(crate) async fn recv_until(outbound: &mut Outbound, text: &str) {
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            match outbound.recv().await {
                Some(payload) if payload.as_ref() == text.as_bytes() => return,
                Some(_) => continue,
                None => panic!("queue closed before {text:?} arrived"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {text:?}"));
}

pub(crate) async fn wait_until_dead(conn: &Arc<Connection>) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !conn.is_dead().await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("connection should have been marked dead");
}

pub(crate) async fn wait_for_members(hub: &Arc<Hub>, count: usize) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while hub.member_count().await != count {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("hub {} never reached {count} members", hub.id()));
}

pub(crate) async fn wait_for_removal(registry: &HubRegistry, room: &str) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while registry.get(room).await.is_some() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("room {room} was never removed"));
}
