//! HTTP surface: one `GET` route per lobby operation, plus `/health`.
//!
//! Handlers only translate query strings into [`LobbyCommand`]s and wait
//! for the lobby loop's answer. Failures are sent back in-band with
//! status 200.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use marble_maze_shared::protocol::{
    HealthResponse, JoinQuery, JoinResponse, LobbyQuery, LobbyResponse, LobbyWire,
    MessageResponse, PollQuery, PollResponse, PowerUpQuery,
};
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;

use crate::error::SyncError;
use crate::lobby_loop::LobbyCommand;

/// Shared app state passed to each handler
#[derive(Clone)]
pub struct AppState {
    pub lobby_tx: mpsc::Sender<LobbyCommand>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/lobby/create", get(create_handler))
        .route("/lobby/join", get(join_handler))
        .route("/lobby/start", get(start_handler))
        .route("/lobby/reset", get(reset_handler))
        .route("/lobby/powerup", get(power_up_handler))
        .route("/lobby/poll", get(poll_handler))
        .route("/health", get(|| async { Json(HealthResponse::ok()) }))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Query string for a lobby route. Numeric fields parse leniently on their
/// own; a query that still fails to deserialize (a repeated key, say) is
/// served as if empty, so the client gets an in-band error instead of a
/// transport-level rejection.
fn query_or_default<T: Default>(query: Result<Query<T>, QueryRejection>) -> T {
    match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::debug!("Unreadable query string: {}", rejection);
            T::default()
        }
    }
}

/// Send a command to the lobby loop and wait for its answer.
async fn dispatch<R>(
    state: &AppState,
    command: impl FnOnce(oneshot::Sender<R>) -> LobbyCommand,
) -> Result<R, SyncError> {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state.lobby_tx.send(command(resp_tx)).await.is_err() {
        tracing::error!("Lobby loop is gone, dropping request");
        return Err(SyncError::Unavailable);
    }
    resp_rx.await.map_err(|_| {
        tracing::error!("Lobby loop dropped a request without answering");
        SyncError::Unavailable
    })
}

async fn create_handler(State(state): State<AppState>) -> Result<Json<LobbyWire>, SyncError> {
    let lobby = dispatch(&state, |response| LobbyCommand::Create { response }).await?;
    Ok(Json(lobby))
}

async fn join_handler(
    State(state): State<AppState>,
    query: Result<Query<JoinQuery>, QueryRejection>,
) -> Result<Json<JoinResponse>, SyncError> {
    let query = query_or_default(query);
    let joined = dispatch(&state, |response| LobbyCommand::Join { query, response }).await??;
    Ok(Json(joined))
}

async fn start_handler(
    State(state): State<AppState>,
    query: Result<Query<LobbyQuery>, QueryRejection>,
) -> Result<Json<LobbyResponse>, SyncError> {
    let lobby = query_or_default(query).lobby;
    let started = dispatch(&state, |response| LobbyCommand::Start { lobby, response }).await??;
    Ok(Json(started))
}

async fn reset_handler(
    State(state): State<AppState>,
    query: Result<Query<LobbyQuery>, QueryRejection>,
) -> Result<Json<LobbyResponse>, SyncError> {
    let lobby = query_or_default(query).lobby;
    let reset = dispatch(&state, |response| LobbyCommand::Reset { lobby, response }).await??;
    Ok(Json(reset))
}

async fn power_up_handler(
    State(state): State<AppState>,
    query: Result<Query<PowerUpQuery>, QueryRejection>,
) -> Result<Json<MessageResponse>, SyncError> {
    let query = query_or_default(query);
    let message = dispatch(&state, |response| LobbyCommand::PowerUp { query, response }).await??;
    Ok(Json(message))
}

async fn poll_handler(
    State(state): State<AppState>,
    query: Result<Query<PollQuery>, QueryRejection>,
) -> Result<Json<PollResponse>, SyncError> {
    let query = query_or_default(query);
    let polled = dispatch(&state, |response| LobbyCommand::Poll { query, response }).await??;
    Ok(Json(polled))
}
