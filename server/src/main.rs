use std::sync::Arc;

use marble_maze_server::clock::SystemClock;
use marble_maze_server::config::ServerConfig;
use marble_maze_server::http::{router, AppState};
use marble_maze_server::lobby_loop::{run_lobby_loop, LobbyCommand};
use marble_maze_server::sync::SyncEndpoint;
use tokio::sync::mpsc;

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

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();
    let endpoint = SyncEndpoint::new(config.game, config.rng_seed, Arc::new(SystemClock));
    let (lobby_tx, lobby_rx) = mpsc::channel::<LobbyCommand>(config.command_buffer);

    // Spawn lobby loop
    tokio::spawn(run_lobby_loop(lobby_rx, endpoint, config));

    let app = router(AppState { lobby_tx });

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Marble maze server listening on {}", listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
