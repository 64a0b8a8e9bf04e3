use anyhow::{Context, Result};
use hub_engine::{
    ConnectionConfig, DEFAULT_BROADCAST_QUEUE_CAPACITY, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_NOTICE_QUEUE_CAPACITY, DEFAULT_OUTBOUND_QUEUE_CAPACITY, DEFAULT_PING_PERIOD,
    DEFAULT_READ_DEADLINE, DEFAULT_WRITE_DEADLINE, HubConfig,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / hubcast.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   hubcast.toml:    [connection]
//                    ping_period_secs = 20
//
//   env var:         HUBCAST_CONNECTION__PING_PERIOD_SECS=20   (double underscore = nesting)
//
//   (single underscore stays within field names)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub hub: HubFileConfig,
    #[serde(default)]
    pub connection: ConnectionFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Per-room queue sizes (lives under `[hub]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HubFileConfig {
    #[serde(default = "default_broadcast_queue_capacity")]
    pub broadcast_queue_capacity: usize,
    #[serde(default = "default_notice_queue_capacity")]
    pub notice_queue_capacity: usize,
}

impl Default for HubFileConfig {
    fn default() -> Self {
        Self {
            broadcast_queue_capacity: default_broadcast_queue_capacity(),
            notice_queue_capacity: default_notice_queue_capacity(),
        }
    }
}

/// Per-client limits and keepalive timing (lives under `[connection]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionFileConfig {
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_read_deadline_secs")]
    pub read_deadline_secs: u64,
    #[serde(default = "default_write_deadline_secs")]
    pub write_deadline_secs: u64,
    #[serde(default = "default_ping_period_secs")]
    pub ping_period_secs: u64,
}

impl Default for ConnectionFileConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_outbound_queue_capacity(),
            max_message_size: default_max_message_size(),
            read_deadline_secs: default_read_deadline_secs(),
            write_deadline_secs: default_write_deadline_secs(),
            ping_period_secs: default_ping_period_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_broadcast_queue_capacity() -> usize {
    DEFAULT_BROADCAST_QUEUE_CAPACITY
}
fn default_notice_queue_capacity() -> usize {
    DEFAULT_NOTICE_QUEUE_CAPACITY
}
fn default_outbound_queue_capacity() -> usize {
    DEFAULT_OUTBOUND_QUEUE_CAPACITY
}
fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}
fn default_read_deadline_secs() -> u64 {
    DEFAULT_READ_DEADLINE.as_secs()
}
fn default_write_deadline_secs() -> u64 {
    DEFAULT_WRITE_DEADLINE.as_secs()
}
fn default_ping_period_secs() -> u64 {
    DEFAULT_PING_PERIOD.as_secs()
}

/// Build a figment that layers: defaults → hubcast.toml → HUBCAST_* env vars.
///
/// A missing file is not an error; its layer is simply empty.
///
/// Env vars use double-underscore for nesting into sections:
///   `HUBCAST_SERVER__PORT=9000`  →  `server.port = 9000`
///   `HUBCAST_HUB__BROADCAST_QUEUE_CAPACITY=1024`  →  `hub.broadcast_queue_capacity = 1024`
pub fn load_config(path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HUBCAST_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, used by the server)
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub hub: HubConfig,
    pub connection: ConnectionConfig,
}

impl ServerConfig {
    /// Resolve and validate. The server refuses to start on error.
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        let addr = format!("{}:{}", fc.server.host, fc.server.port)
            .parse::<SocketAddr>()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    fc.server.host, fc.server.port
                )
            })?;

        let hub = HubConfig {
            broadcast_queue_capacity: fc.hub.broadcast_queue_capacity,
            notice_queue_capacity: fc.hub.notice_queue_capacity,
        };
        hub.validate().context("Invalid [hub] configuration")?;

        let connection = ConnectionConfig {
            outbound_queue_capacity: fc.connection.outbound_queue_capacity,
            max_message_size: fc.connection.max_message_size,
            read_deadline: Duration::from_secs(fc.connection.read_deadline_secs),
            write_deadline: Duration::from_secs(fc.connection.write_deadline_secs),
            ping_period: Duration::from_secs(fc.connection.ping_period_secs),
        };
        connection
            .validate()
            .context("Invalid [connection] configuration")?;

        Ok(Self {
            addr,
            hub,
            connection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── FileConfig defaults ─────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 8080);
        assert_eq!(fc.hub.broadcast_queue_capacity, 256);
        assert_eq!(fc.hub.notice_queue_capacity, 64);
        assert_eq!(fc.connection.outbound_queue_capacity, 256);
        assert_eq!(fc.connection.max_message_size, 512);
        assert_eq!(fc.connection.read_deadline_secs, 60);
        assert_eq!(fc.connection.write_deadline_secs, 10);
        assert_eq!(fc.connection.ping_period_secs, 54);
    }

    #[test]
    fn test_file_config_roundtrips_through_toml() {
        let fc = FileConfig::default();
        let rendered = toml::to_string_pretty(&fc).unwrap();
        assert!(rendered.contains("[connection]"));
        let parsed: FileConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, fc);
    }

    // ── ServerConfig::from_file ─────────────────────────────────────────

    #[test]
    fn test_server_config_from_defaults() {
        let sc = ServerConfig::from_file(&FileConfig::default()).unwrap();
        assert_eq!(sc.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(sc.hub, HubConfig::default());
        assert_eq!(sc.connection, ConnectionConfig::default());
    }

    #[test]
    fn test_server_config_rejects_ping_not_below_read_deadline() {
        let fc = FileConfig {
            connection: ConnectionFileConfig {
                read_deadline_secs: 30,
                ping_period_secs: 30,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = ServerConfig::from_file(&fc).unwrap_err();
        assert!(format!("{:#}", err).contains("ping period"));
    }

    #[test]
    fn test_server_config_rejects_zero_capacity() {
        let fc = FileConfig {
            hub: HubFileConfig {
                broadcast_queue_capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(ServerConfig::from_file(&fc).is_err());
    }

    #[test]
    fn test_server_config_rejects_bad_host() {
        let fc = FileConfig {
            server: ServerFileConfig {
                host: "not a host".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(ServerConfig::from_file(&fc).is_err());
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(&tmp.path().join("hubcast.toml"))
            .extract()
            .unwrap();
        assert_eq!(fc.server, ServerFileConfig::default());
        assert_eq!(fc.hub, HubFileConfig::default());
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hubcast.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\n\n[connection]\nping_period_secs = 20\nread_deadline_secs = 25\n",
        )
        .unwrap();

        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.server.port, 9000);
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.connection.ping_period_secs, 20);
        assert_eq!(fc.connection.read_deadline_secs, 25);
        assert_eq!(fc.connection.max_message_size, 512);

        let sc = ServerConfig::from_file(&fc).unwrap();
        assert_eq!(sc.connection.ping_period, Duration::from_secs(20));
    }
}
