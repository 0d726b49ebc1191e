use axum::routing::get;
use axum::Router;
use blitz_server::config::ServerConfig;
use blitz_server::game_loop::{run_game_loop, GameBroadcast, GameCommand};
use blitz_server::profile::{run_persistence, MemoryProfileStore, ProfileStore, StatsDelta};
use blitz_server::ws::{ws_handler, AppState};
use blitz_shared::config::BlitzConfig;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid server configuration: {}", e);
            std::process::exit(1);
        }
    };
    let blitz_config = BlitzConfig::default();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = blitz_config.validate() {
        eprintln!("Invalid game configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();
    let max_connections = config.max_connections;

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<GameBroadcast>(256);
    let (persist_tx, persist_rx) = mpsc::channel::<StatsDelta>(config.persist_queue);

    // Stats go to an in-memory store; swap in another ProfileStore to keep them across restarts
    let store: Arc<dyn ProfileStore> = Arc::new(MemoryProfileStore::new());
    tokio::spawn(run_persistence(persist_rx, store));

    // Spawn game loop
    let bc_tx = broadcast_tx.clone();
    tokio::spawn(async move {
        run_game_loop(game_rx, bc_tx, config, blitz_config, persist_tx).await;
    });

    // Axum app
    let app_state = AppState {
        game_tx,
        broadcast_tx,
        connections: Arc::new(Semaphore::new(max_connections)),
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!("Starting Blitz server on {}", listen_addr);
    println!("Blitz server listening on {}", listen_addr);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
