use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use hub_engine::{ConnectionConfig, HubRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
mod metrics;

#[cfg(test)]
mod test_helpers;

use crate::config::{FileConfig, ServerConfig, load_config};
use crate::metrics::ServerMetrics;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "hubcast")]
#[command(about = "Multi-room websocket broadcast server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (optional; missing file means defaults)
    #[arg(long, global = true, default_value = "hubcast.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broadcast server in the foreground
    Serve(ServeArgs),

    /// Print the resolved configuration as TOML
    Config,
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Host to bind to (overrides [server].host)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on (overrides [server].port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    /// Room id to hub mapping, shared by every session
    pub registry: HubRegistry,
    /// Limits applied to each websocket session
    pub connection_config: ConnectionConfig,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut file_config: FileConfig = load_config(&cli.config)
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Some(Commands::Config) => {
            let rendered =
                toml::to_string_pretty(&file_config).context("Failed to render configuration")?;
            print!("{}", rendered);
            Ok(())
        }
        Some(Commands::Serve(args)) => {
            apply_overrides(&mut file_config, &args);
            run_server(file_config, args.debug).await
        }
        None => run_server(file_config, false).await,
    }
}

/// CLI flags win over file and environment settings.
fn apply_overrides(file_config: &mut FileConfig, args: &ServeArgs) {
    if let Some(host) = &args.host {
        file_config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        file_config.server.port = port;
    }
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{room}", get(handlers::ws_handler))
        .route("/rooms", get(handlers::list_rooms))
        .route("/rooms/{room}", get(handlers::get_room))
        .route("/broadcast", post(handlers::broadcast_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}

async fn run_server(file_config: FileConfig, debug: bool) -> Result<()> {
    // Setup logging
    let default_directive = if debug {
        "hubcast=debug,hub_engine=debug,tower_http=debug,info"
    } else {
        "hubcast=info,hub_engine=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let server_config = ServerConfig::from_file(&file_config)?;
    info!("Starting hubcast");

    let registry = HubRegistry::new(server_config.hub);
    let app_state = AppState {
        registry: registry.clone(),
        connection_config: server_config.connection,
        metrics: Arc::new(ServerMetrics::new()),
    };
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(server_config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.addr))?;
    let actual_addr = listener.local_addr()?;

    info!("hubcast listening on http://{}", actual_addr);
    info!("Endpoints:");
    info!("  GET    /ws/{{room}}      - Join a room over WebSocket");
    info!("  GET    /rooms           - List rooms");
    info!("  GET    /rooms/{{room}}    - Room details");
    info!("  POST   /broadcast       - Send a message to every room");
    info!("  GET    /health          - Health check");
    info!("  GET    /metrics         - Server metrics");

    // Upgraded websockets are not tracked by graceful shutdown, so the
    // registry closes them as soon as the signal arrives.
    let shutdown_registry = registry.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing rooms...");
        shutdown_registry.shutdown().await;
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    // Rooms created by upgrades that raced the signal
    registry.shutdown().await;

    info!("Shutdown complete");
    server_result
}
