use axum::response::{IntoResponse, Response};
use axum::Json;
use marble_maze_shared::protocol::ErrorResponse;

/// Request failures. All of them travel in-band as `{ "error": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Lobby doesn't exist.")]
    LobbyNotFound,

    #[error("Lobby full.")]
    LobbyFull,

    #[error("Player not in game.")]
    PlayerNotInGame,

    /// The lobby loop has stopped.
    #[error("Server unavailable.")]
    Unavailable,
}

impl SyncError {
    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        // Status stays 200; clients read the error field.
        Json(self.body()).into_response()
    }
}
