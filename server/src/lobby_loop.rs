//! Single task that owns every lobby and serves handler commands in order.

use std::time::Duration;

use marble_maze_shared::protocol::{
    JoinQuery, JoinResponse, LobbyId, LobbyResponse, LobbyWire, MessageResponse, PollQuery,
    PollResponse, PowerUpQuery,
};
use tokio::sync::{mpsc, oneshot};

use crate::config::ServerConfig;
use crate::error::SyncError;
use crate::sync::SyncEndpoint;

type Reply<T> = oneshot::Sender<Result<T, SyncError>>;

/// Commands from HTTP handlers to the lobby loop
pub enum LobbyCommand {
    Create {
        response: oneshot::Sender<LobbyWire>,
    },
    Join {
        query: JoinQuery,
        response: Reply<JoinResponse>,
    },
    Start {
        lobby: LobbyId,
        response: Reply<LobbyResponse>,
    },
    Reset {
        lobby: LobbyId,
        response: Reply<LobbyResponse>,
    },
    PowerUp {
        query: PowerUpQuery,
        response: Reply<MessageResponse>,
    },
    Poll {
        query: PollQuery,
        response: Reply<PollResponse>,
    },
}

impl LobbyCommand {
    /// Run the command against `endpoint` and answer the waiting handler.
    /// A handler that went away is not an error.
    fn execute(self, endpoint: &mut SyncEndpoint) {
        match self {
            LobbyCommand::Create { response } => {
                let _ = response.send(endpoint.create());
            }
            LobbyCommand::Join { query, response } => {
                let _ = response.send(endpoint.join(&query));
            }
            LobbyCommand::Start { lobby, response } => {
                let _ = response.send(endpoint.start(&lobby));
            }
            LobbyCommand::Reset { lobby, response } => {
                let _ = response.send(endpoint.reset(&lobby));
            }
            LobbyCommand::PowerUp { query, response } => {
                let _ = response.send(endpoint.pick_up_power_up(&query));
            }
            LobbyCommand::Poll { query, response } => {
                let _ = response.send(endpoint.poll(&query));
            }
        }
    }
}

/// Run the lobby loop. Owns every lobby; commands run one at a time.
pub async fn run_lobby_loop(
    mut cmd_rx: mpsc::Receiver<LobbyCommand>,
    mut endpoint: SyncEndpoint,
    server_config: ServerConfig,
) {
    let mut reap_interval =
        tokio::time::interval(Duration::from_millis(server_config.reap_interval_ms));
    reap_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = reap_interval.tick() => {
                if let Some(ttl) = server_config.lobby_idle_ttl_ms {
                    endpoint.reap_idle_lobbies(ttl);
                }
            }

            Some(cmd) = cmd_rx.recv() => {
                cmd.execute(&mut endpoint);
            }

            else => break,
        }
    }

    tracing::info!("Lobby loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn spawn_loop(config: ServerConfig, clock: ManualClock) -> mpsc::Sender<LobbyCommand> {
        let endpoint = SyncEndpoint::new(config.game, Some(1), Arc::new(clock));
        let (tx, rx) = mpsc::channel(config.command_buffer);
        tokio::spawn(run_lobby_loop(rx, endpoint, config));
        tx
    }

    #[tokio::test]
    async fn commands_are_answered_in_order() {
        let tx = spawn_loop(ServerConfig::default(), ManualClock::new(0));

        let (response, rx) = oneshot::channel();
        tx.send(LobbyCommand::Create { response }).await.unwrap();
        let lobby = rx.await.unwrap();

        let (response, rx) = oneshot::channel();
        tx.send(LobbyCommand::Join {
            query: JoinQuery {
                lobby: lobby.id.clone(),
                username: "ada".to_string(),
            },
            response,
        })
        .await
        .unwrap();
        let joined = rx.await.unwrap().unwrap();
        assert_eq!(joined.lobby.players.len(), 1);

        let (response, rx) = oneshot::channel();
        tx.send(LobbyCommand::Start {
            lobby: lobby.id.clone(),
            response,
        })
        .await
        .unwrap();
        assert_eq!(
            rx.await.unwrap().unwrap().lobby.status,
            marble_maze_shared::protocol::LobbyStatus::Playing
        );
    }

    #[tokio::test]
    async fn errors_travel_back_to_caller() {
        let tx = spawn_loop(ServerConfig::default(), ManualClock::new(0));
        let (response, rx) = oneshot::channel();
        tx.send(LobbyCommand::Reset {
            lobby: "NOPE".to_string(),
            response,
        })
        .await
        .unwrap();
        assert_eq!(rx.await.unwrap().unwrap_err(), SyncError::LobbyNotFound);
    }

    #[tokio::test]
    async fn reap_tick_removes_idle_lobbies() {
        let clock = ManualClock::new(0);
        let config = ServerConfig {
            reap_interval_ms: 10,
            lobby_idle_ttl_ms: Some(5_000),
            ..Default::default()
        };
        let tx = spawn_loop(config, clock.clone());

        let (response, rx) = oneshot::channel();
        tx.send(LobbyCommand::Create { response }).await.unwrap();
        let lobby = rx.await.unwrap();

        clock.advance(10_000);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let (response, rx) = oneshot::channel();
        tx.send(LobbyCommand::Start {
            lobby: lobby.id,
            response,
        })
        .await
        .unwrap();
        assert_eq!(rx.await.unwrap().unwrap_err(), SyncError::LobbyNotFound);
    }
}
