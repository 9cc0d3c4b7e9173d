//! Request handling for every lobby route.
//!
//! `SyncEndpoint` runs one request to completion at a time; the lobby loop
//! owns it, so no locking is needed here.

use std::sync::Arc;

use marble_maze_shared::config::GameConfig;
use marble_maze_shared::protocol::{
    JoinQuery, JoinResponse, LobbyId, LobbyResponse, LobbyWire, MessageResponse, PollQuery,
    PollResponse, PowerUpQuery,
};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::player::MovementReport;
use crate::store::LobbyStore;

pub struct SyncEndpoint {
    store: LobbyStore,
    clock: Arc<dyn Clock>,
    config: GameConfig,
    /// Timestamp of the last poll response, kept strictly increasing
    last_response_ms: i64,
}

impl SyncEndpoint {
    pub fn new(config: GameConfig, rng_seed: Option<u64>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: LobbyStore::new(rng_seed),
            clock,
            config,
            last_response_ms: i64::MIN,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn store(&self) -> &LobbyStore {
        &self.store
    }

    /// Poll response time: the clock, bumped past the previous response if
    /// the clock has not moved on.
    fn next_timestamp(&mut self, now_ms: i64) -> i64 {
        let timestamp = now_ms.max(self.last_response_ms.saturating_add(1));
        self.last_response_ms = timestamp;
        timestamp
    }

    pub fn create(&mut self) -> LobbyWire {
        let now = self.clock.now_ms();
        let lobby = self.store.create(&self.config, now);
        tracing::info!(
            "Lobby {} created ({}x{}, {} power-ups)",
            lobby.id,
            lobby.board_size,
            lobby.board_size,
            lobby.power_ups.len()
        );
        lobby.snapshot()
    }

    pub fn join(&mut self, query: &JoinQuery) -> Result<JoinResponse, SyncError> {
        let now = self.clock.now_ms();
        let result = self
            .store
            .join(&query.lobby, query.username.clone(), &self.config, now);
        let (player, lobby) = match result {
            Ok(joined) => joined,
            Err(e) => {
                tracing::warn!("Join to lobby {:?} rejected: {}", query.lobby, e);
                return Err(e);
            }
        };
        tracing::info!(
            "Player {} ({}) joined lobby {}, {} in roster",
            player,
            query.username,
            lobby.id,
            lobby.players.len()
        );
        let lobby = self.store.get_mut(&query.lobby)?;
        lobby.touch(now);
        Ok(JoinResponse {
            player,
            lobby: lobby.snapshot(),
        })
    }

    pub fn start(&mut self, lobby_id: &str) -> Result<LobbyResponse, SyncError> {
        let now = self.clock.now_ms();
        let lobby = self.store.get_mut(lobby_id).inspect_err(|e| {
            tracing::warn!("Start of lobby {:?} rejected: {}", lobby_id, e);
        })?;
        lobby.touch(now);
        lobby.start();
        tracing::info!("Lobby {} started with {} players", lobby.id, lobby.players.len());
        Ok(LobbyResponse {
            lobby: lobby.snapshot(),
        })
    }

    pub fn reset(&mut self, lobby_id: &str) -> Result<LobbyResponse, SyncError> {
        let now = self.clock.now_ms();
        self.store.reset(lobby_id, &self.config).inspect_err(|e| {
            tracing::warn!("Reset of lobby {:?} rejected: {}", lobby_id, e);
        })?;
        let lobby = self.store.get_mut(lobby_id)?;
        lobby.touch(now);
        tracing::info!("Lobby {} reset", lobby.id);
        Ok(LobbyResponse {
            lobby: lobby.snapshot(),
        })
    }

    /// Claim the power-up on a cell. Succeeds whether or not the claim took.
    pub fn pick_up_power_up(&mut self, query: &PowerUpQuery) -> Result<MessageResponse, SyncError> {
        let now = self.clock.now_ms();
        let lobby = self.store.get_mut(&query.lobby).inspect_err(|e| {
            tracing::warn!("Power-up pickup in lobby {:?} rejected: {}", query.lobby, e);
        })?;
        lobby.touch(now);
        let Some((x, y)) = query.cell() else {
            tracing::debug!("Power-up claim in lobby {} names no cell", lobby.id);
            return Ok(MessageResponse::success());
        };
        if lobby.pick_up(x, y, &query.player, now) {
            tracing::debug!(
                "Player {} picked up power-up ({}, {}) in lobby {}",
                query.player,
                x,
                y,
                lobby.id
            );
        }
        Ok(MessageResponse::success())
    }

    /// Merge one client's report into its lobby and return the lobby.
    ///
    /// A report is applied only when newer than the player's last one; it
    /// may claim the win and then moves the shared tilt toward the players'
    /// mean. Expired power-ups and silent players are removed on every poll,
    /// spectators included.
    pub fn poll(&mut self, query: &PollQuery) -> Result<PollResponse, SyncError> {
        let now = self.clock.now_ms();
        let lobby = self.store.get_mut(&query.lobby).inspect_err(|e| {
            tracing::warn!("Poll of lobby {:?} rejected: {}", query.lobby, e);
        })?;
        lobby.touch(now);

        if let Some(player_id) = query.player.as_deref().filter(|p| !p.is_empty()) {
            let report = MovementReport::from_query(query);
            let accepted = lobby.apply_update(player_id, report.as_ref()).inspect_err(|e| {
                tracing::warn!("Poll by {} in lobby {} rejected: {}", player_id, lobby.id, e);
            })?;
            if accepted {
                if query.is_win() && lobby.declare_winner(player_id) {
                    tracing::info!("Player {} won lobby {}", player_id, lobby.id);
                }
                lobby.blend_gravity(&self.config);
                tracing::debug!(
                    "Lobby {} tilt now {:.4} after report from {}",
                    lobby.id,
                    lobby.gravity_angle,
                    player_id
                );
            }
        }

        let collected = lobby.collect_garbage(now, &self.config);
        for id in &collected.evicted {
            tracing::info!("Player {} evicted from lobby {} after going silent", id, lobby.id);
        }
        if collected.expired_power_ups > 0 {
            tracing::debug!(
                "{} power-ups expired in lobby {}",
                collected.expired_power_ups,
                lobby.id
            );
        }

        let lobby = lobby.snapshot();
        Ok(PollResponse {
            timestamp: self.next_timestamp(now),
            lobby,
        })
    }

    /// Drop lobbies idle for longer than `ttl_ms` whose players have all
    /// gone silent.
    pub fn reap_idle_lobbies(&mut self, ttl_ms: i64) -> Vec<LobbyId> {
        let now = self.clock.now_ms();
        let reaped = self
            .store
            .reap_idle(now, ttl_ms, self.config.player_timeout_ms);
        if !reaped.is_empty() {
            tracing::info!(
                "Reaped {} idle lobbies, {} remain",
                reaped.len(),
                self.store.len()
            );
        }
        reaped
    }
}
