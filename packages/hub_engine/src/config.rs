use std::time::Duration;

use crate::error::ConfigError;

/// Default depth of a hub's broadcast queue. Up to this many in-flight
/// messages are never lost to dispatch latency.
pub const DEFAULT_BROADCAST_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_NOTICE_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;
pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(60);
pub const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// 9/10 of the read deadline, so a ping lands before the peer's read side
/// gives up on us.
pub const DEFAULT_PING_PERIOD: Duration = Duration::from_secs(54);

/// Per-hub tunables, shared by every hub a registry creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Pending broadcasts per room before producers block
    pub broadcast_queue_capacity: usize,
    /// Informational notice pairs parked while the broadcast queue is full
    pub notice_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_queue_capacity: DEFAULT_BROADCAST_QUEUE_CAPACITY,
            notice_queue_capacity: DEFAULT_NOTICE_QUEUE_CAPACITY,
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_queue_capacity == 0 {
            return Err(ConfigError::Zero("broadcast_queue_capacity"));
        }
        if self.notice_queue_capacity == 0 {
            return Err(ConfigError::Zero("notice_queue_capacity"));
        }
        Ok(())
    }
}

/// Per-connection tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Outbound payloads buffered for a client; a full queue means the
    /// client is too slow and gets dropped
    pub outbound_queue_capacity: usize,
    /// Largest text payload the reader accepts
    pub max_message_size: usize,
    /// Idle-read timeout, reset by every received frame
    pub read_deadline: Duration,
    /// Upper bound on a single frame write
    pub write_deadline: Duration,
    /// Interval between keepalive pings; fixed rate, regardless of traffic
    pub ping_period: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_deadline: DEFAULT_READ_DEADLINE,
            write_deadline: DEFAULT_WRITE_DEADLINE,
            ping_period: DEFAULT_PING_PERIOD,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Zero("outbound_queue_capacity"));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Zero("max_message_size"));
        }
        if self.write_deadline.is_zero() {
            return Err(ConfigError::Zero("write_deadline"));
        }
        if self.ping_period.is_zero() {
            return Err(ConfigError::Zero("ping_period"));
        }
        if self.ping_period >= self.read_deadline {
            return Err(ConfigError::PingPeriodTooLong {
                ping: self.ping_period,
                read: self.read_deadline,
            });
        }
        Ok(())
    }
}
