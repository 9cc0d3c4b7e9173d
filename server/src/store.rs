//! Lobby registry keyed by id, with the shared random source.

use std::collections::HashMap;

use marble_maze_shared::config::GameConfig;
use marble_maze_shared::protocol::{LobbyId, PlayerId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::SyncError;
use crate::lobby::Lobby;
use crate::player::Player;

const LOBBY_ID_LEN: usize = 6;
const LOBBY_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const PLAYER_ID_LIMIT: u32 = 1_000_000_000;

/// Every live lobby, plus the random source all of them draw from.
pub struct LobbyStore {
    lobbies: HashMap<LobbyId, Lobby>,
    rng: ChaCha8Rng,
}

impl LobbyStore {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            lobbies: HashMap::new(),
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    fn fresh_lobby_id(&mut self) -> LobbyId {
        loop {
            let id: String = (0..LOBBY_ID_LEN)
                .map(|_| LOBBY_ID_ALPHABET[self.rng.gen_range(0..LOBBY_ID_ALPHABET.len())] as char)
                .collect();
            if !self.lobbies.contains_key(&id) {
                return id;
            }
        }
    }

    /// Create a waiting lobby under a new id.
    pub fn create(&mut self, config: &GameConfig, now_ms: i64) -> &Lobby {
        let id = self.fresh_lobby_id();
        let lobby = Lobby::new(id.clone(), config, &mut self.rng, now_ms);
        self.lobbies.entry(id).or_insert(lobby)
    }

    pub fn get(&self, id: &str) -> Result<&Lobby, SyncError> {
        self.lobbies.get(id).ok_or(SyncError::LobbyNotFound)
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Lobby, SyncError> {
        self.lobbies.get_mut(id).ok_or(SyncError::LobbyNotFound)
    }

    /// Add a player under an id unique within the lobby. The player's
    /// `lastPoll` starts `join_grace_ms` in the future.
    pub fn join(
        &mut self,
        id: &str,
        username: String,
        config: &GameConfig,
        now_ms: i64,
    ) -> Result<(PlayerId, &Lobby), SyncError> {
        let lobby = self.lobbies.get_mut(id).ok_or(SyncError::LobbyNotFound)?;
        if lobby.players.len() >= config.max_players {
            return Err(SyncError::LobbyFull);
        }

        let player_id = loop {
            let candidate = self.rng.gen_range(0..PLAYER_ID_LIMIT).to_string();
            if !lobby.players.contains_key(&candidate) {
                break candidate;
            }
        };
        let player = Player::new(
            player_id.clone(),
            username,
            now_ms.saturating_add(config.join_grace_ms),
        );
        lobby.add_player(player, config.max_players)?;
        Ok((player_id, &*lobby))
    }

    pub fn reset(&mut self, id: &str, config: &GameConfig) -> Result<&Lobby, SyncError> {
        let lobby = self.lobbies.get_mut(id).ok_or(SyncError::LobbyNotFound)?;
        lobby.reset(config, &mut self.rng);
        Ok(&*lobby)
    }

    /// Remove lobbies with no live players whose last activity is more
    /// than `ttl_ms` ago. Players silent for longer than
    /// `player_timeout_ms` count as gone. Returns the removed ids.
    pub fn reap_idle(
        &mut self,
        now_ms: i64,
        ttl_ms: i64,
        player_timeout_ms: i64,
    ) -> Vec<LobbyId> {
        let idle: Vec<LobbyId> = self
            .lobbies
            .values()
            .filter(|l| {
                l.last_activity.saturating_add(ttl_ms) < now_ms
                    && l.players
                        .values()
                        .all(|p| p.is_stale(now_ms, player_timeout_ms))
            })
            .map(|l| l.id.clone())
            .collect();
        for id in &idle {
            self.lobbies.remove(id);
        }
        idle
    }
}
