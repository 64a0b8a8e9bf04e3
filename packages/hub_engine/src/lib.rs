//! Multi-room broadcast engine.
//!
//! Clients join named rooms; every text message a member sends is fanned out
//! to all members of that room, the sender included. Each room is a [`Hub`]
//! with its own dispatch loop, created on first join and torn down when its
//! last member leaves. The [`HubRegistry`] maps room ids to hubs.
//!
//! A slow client never stalls its room: broadcasts go into a bounded
//! per-connection queue, and a client whose queue is full is disconnected.
//!
//! The engine is transport agnostic. Anything implementing [`FrameSource`]
//! and [`FrameSink`] can be handed to [`run_session`].

mod config;
mod connection;
mod error;
mod frame;
mod hub;
mod registry;
mod session;
mod stats;

#[cfg(test)]
mod test_helpers;

pub use config::{
    ConnectionConfig, DEFAULT_BROADCAST_QUEUE_CAPACITY, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_NOTICE_QUEUE_CAPACITY, DEFAULT_OUTBOUND_QUEUE_CAPACITY, DEFAULT_PING_PERIOD,
    DEFAULT_READ_DEADLINE, DEFAULT_WRITE_DEADLINE, HubConfig,
};
pub use connection::{Connection, ConnectionId, Outbound, SendOutcome};
pub use error::{ConfigError, ConnectionError, HubError, TransportError};
pub use frame::{Frame, FrameSink, FrameSource, OpCode, Payload};
pub use hub::Hub;
pub use registry::{HubRegistry, RoomSummary};
pub use session::run_session;
pub use stats::{HubStats, StatsSnapshot};
