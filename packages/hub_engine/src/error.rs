use std::time::Duration;

/// Failures reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer went away or the stream ended
    #[error("transport closed")]
    Closed,
    /// Any other I/O level failure
    #[error("transport I/O failed: {0}")]
    Io(String),
}

/// Why a connection's reader or writer loop stopped.
///
/// Every variant is fatal to the connection and never to the room; the
/// session driver answers all of them the same way, by unregistering.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("read failed: {0}")]
    Read(TransportError),

    #[error("no frame received within {0:?}")]
    ReadTimeout(Duration),

    #[error("write failed: {0}")]
    Write(TransportError),

    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Hub(#[from] HubError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The hub has been torn down and no longer accepts requests
    #[error("hub {0} is closed")]
    Closed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("ping period {ping:?} must be shorter than the read deadline {read:?}")]
    PingPeriodTooLong { ping: Duration, read: Duration },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
