//! Drives one client from join to leave.

use tokio::task::JoinError;
use tracing::{debug, error, info};

use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::{ConnectionError, HubError};
use crate::frame::{FrameSink, FrameSource};
use crate::registry::HubRegistry;

/// Join `room` and pump frames until either half of the connection stops.
///
/// Whichever of the reader and writer finishes first triggers a single
/// unregister; the hub then marks the connection dead, which stops the other
/// half. Returns once both halves are done. Fails only if the room could not
/// be joined.
pub async fn run_session<S, K>(
    registry: &HubRegistry,
    room: &str,
    source: S,
    sink: K,
    config: &ConnectionConfig,
) -> Result<ConnectionId, HubError>
where
    S: FrameSource,
    K: FrameSink,
{
    let (conn, outbound) = Connection::new(config.outbound_queue_capacity);
    let id = conn.id();
    let hub = registry.join(room, conn.clone()).await?;
    debug!(hub = %room, conn = %id, "Session started");

    let mut reader = tokio::spawn(conn.clone().read_loop(source, hub.clone(), *config));
    let mut writer = tokio::spawn(conn.clone().write_loop(sink, outbound, *config));

    let reader_first = tokio::select! {
        result = &mut reader => {
            log_exit(room, id, "reader", result);
            true
        }
        result = &mut writer => {
            log_exit(room, id, "writer", result);
            false
        }
    };

    if hub.unregister(conn.clone()).await.is_err() {
        // Hub already gone; nobody else will close the connection
        conn.mark_dead().await;
    }

    if reader_first {
        log_exit(room, id, "writer", writer.await);
    } else {
        log_exit(room, id, "reader", reader.await);
    }

    debug!(hub = %room, conn = %id, "Session finished");
    Ok(id)
}

fn log_exit(
    room: &str,
    conn: ConnectionId,
    half: &str,
    result: Result<Result<(), ConnectionError>, JoinError>,
) {
    match result {
        Ok(Ok(())) => debug!(hub = %room, conn = %conn, "{} finished", half),
        Ok(Err(
            e @ (ConnectionError::ReadTimeout(_) | ConnectionError::Read(_) | ConnectionError::Hub(_)),
        )) => debug!(hub = %room, conn = %conn, "{} stopped: {}", half, e),
        Ok(Err(e)) => info!(hub = %room, conn = %conn, "{} stopped: {}", half, e),
        Err(e) => error!(hub = %room, conn = %conn, "{} task failed: {}", half, e),
    }
}
