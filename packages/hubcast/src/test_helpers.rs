use hub_engine::{ConnectionConfig, HubConfig, HubRegistry};
use std::sync::Arc;

use crate::AppState;
use crate::metrics::ServerMetrics;

/// Build an `AppState` with default engine settings and a fresh registry.
pub fn test_app_state() -> AppState {
    test_app_state_with(HubConfig::default(), ConnectionConfig::default())
}

pub fn test_app_state_with(hub: HubConfig, connection: ConnectionConfig) -> AppState {
    AppState {
        registry: HubRegistry::new(hub),
        connection_config: connection,
        metrics: Arc::new(ServerMetrics::new()),
    }
}
