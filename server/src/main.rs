use anyhow::Context;
use axum::body::Bytes;
use axum::routing::get;
use axum::Router;
use blocks_relay::config::ServerConfig;
use blocks_relay::relay_loop::{run_relay_loop, RelayCommand};
use blocks_relay::scene::Scene;
use blocks_relay::simulation::Simulation;
use blocks_relay::world::SceneWorld;
use blocks_relay::ws::{ws_handler, AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().map_err(anyhow::Error::msg)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid server configuration: {e}"))?;

    let session = config.session;
    let (relay_tx, relay_rx) = mpsc::channel::<RelayCommand>(config.command_capacity);
    let (broadcast_tx, _) = broadcast::channel::<Bytes>(config.broadcast_capacity);

    // Spawn relay loop
    let sim = Simulation::new(
        SceneWorld::new(session.tick_rate_hz),
        Scene::room(session.num_pointers),
        &session,
    );
    let bc_tx = broadcast_tx.clone();
    tokio::spawn(async move {
        run_relay_loop(relay_rx, bc_tx, session, sim).await;
    });

    let app_state = AppState {
        relay_tx,
        broadcast_tx,
        heartbeat_interval: Duration::from_millis(session.heartbeat_interval_ms),
    };
    let app = Router::new()
        .route("/", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!("Starting block relay on {}", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
