//! The seam between the broadcast core and whatever carries frames on the
//! wire. The core only cares about opcodes and payloads; encoding, masking and
//! handshakes belong to the transport.

use bytes::Bytes;
use std::future::Future;

use crate::error::TransportError;

/// Payloads are reference counted so one broadcast can be handed to every
/// member without copying.
pub type Payload = Bytes;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub op: OpCode,
    pub payload: Payload,
}

impl Frame {
    pub fn new(op: OpCode, payload: impl Into<Payload>) -> Self {
        Self {
            op,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Payload>) -> Self {
        Self::new(OpCode::Text, payload)
    }

    pub fn ping() -> Self {
        Self::new(OpCode::Ping, Bytes::new())
    }

    pub fn pong() -> Self {
        Self::new(OpCode::Pong, Bytes::new())
    }

    pub fn close() -> Self {
        Self::new(OpCode::Close, Bytes::new())
    }
}

/// Read half of a client transport.
pub trait FrameSource: Send + 'static {
    /// Wait for the next complete frame from the peer.
    fn read_frame(&mut self) -> impl Future<Output = Result<Frame, TransportError>> + Send;
}

/// Write half of a client transport.
pub trait FrameSink: Send + 'static {
    fn write_frame(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
