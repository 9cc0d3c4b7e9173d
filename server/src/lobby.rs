//! One lobby and the rules that move it between states.
//!
//! `waiting → playing` on start, `playing → finished` on the first accepted
//! win, and any state back to `waiting` on reset. Reset regenerates the maze
//! and power-ups but keeps the roster.

use std::collections::BTreeMap;

use marble_maze_shared::config::GameConfig;
use marble_maze_shared::maze::WallCell;
use marble_maze_shared::protocol::{LobbyId, LobbyStatus, LobbyWire, PlayerId, PowerUpWire, Skill};
use rand::Rng;

use crate::error::SyncError;
use crate::maze;
use crate::player::{MovementReport, Player};

/// A collectible on one maze cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerUp {
    pub x: i32,
    pub y: i32,
    pub skill: Skill,
    pub holder: Option<PlayerId>,
    /// Set together with `holder`
    pub time_activated: Option<i64>,
}

impl PowerUp {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            skill: Skill::ZeroGravity,
            holder: None,
            time_activated: None,
        }
    }

    /// The activation window has run out at `now_ms`.
    pub fn is_expired(&self, now_ms: i64, window_ms: i64) -> bool {
        matches!(self.time_activated, Some(t) if now_ms >= t.saturating_add(window_ms))
    }

    pub fn to_wire(&self) -> PowerUpWire {
        PowerUpWire {
            x: self.x,
            y: self.y,
            skill: self.skill,
            holder: self.holder.clone(),
            time_activated: self.time_activated,
        }
    }
}

/// What a garbage collection pass removed.
#[derive(Debug, Default, PartialEq)]
pub struct Collected {
    pub expired_power_ups: usize,
    pub evicted: Vec<PlayerId>,
}

#[derive(Debug, Clone)]
pub struct Lobby {
    pub id: LobbyId,
    pub status: LobbyStatus,
    /// Shared board tilt, an EMA over the players' reported tilts
    pub gravity_angle: f64,
    pub winner: Option<PlayerId>,
    pub board_size: usize,
    pub walls: Vec<WallCell>,
    pub players: BTreeMap<PlayerId, Player>,
    pub power_ups: Vec<PowerUp>,
    /// Time of the last request that touched this lobby (ms)
    pub last_activity: i64,
}

impl Lobby {
    /// A waiting lobby with a fresh maze and power-up set.
    pub fn new(id: LobbyId, config: &GameConfig, rng: &mut impl Rng, now_ms: i64) -> Self {
        let mut lobby = Self {
            id,
            status: LobbyStatus::Waiting,
            gravity_angle: 0.0,
            winner: None,
            board_size: config.board_size,
            walls: maze::generate(config, rng),
            players: BTreeMap::new(),
            power_ups: Vec::new(),
            last_activity: now_ms,
        };
        lobby.regenerate_power_ups(config, rng);
        lobby
    }

    pub fn touch(&mut self, now_ms: i64) {
        self.last_activity = self.last_activity.max(now_ms);
    }

    pub fn add_player(&mut self, player: Player, max_players: usize) -> Result<(), SyncError> {
        if self.players.len() >= max_players {
            return Err(SyncError::LobbyFull);
        }
        self.players.insert(player.id.clone(), player);
        Ok(())
    }

    /// No precondition on the roster.
    pub fn start(&mut self) {
        self.status = LobbyStatus::Playing;
    }

    /// Back to `waiting` with a new maze and power-ups. Players stay.
    pub fn reset(&mut self, config: &GameConfig, rng: &mut impl Rng) {
        self.winner = None;
        self.status = LobbyStatus::Waiting;
        self.walls = maze::generate(&self.rules(config), rng);
        self.regenerate_power_ups(config, rng);
    }

    /// Rules for this lobby's board, which may differ in size from the
    /// current defaults if those changed after creation.
    fn rules(&self, config: &GameConfig) -> GameConfig {
        GameConfig {
            board_size: self.board_size,
            ..*config
        }
    }

    /// Place `⌊size²/density⌋` power-ups on distinct random cells. A
    /// placement that lands on an occupied cell is retried a bounded number
    /// of times, then given up, so the set may come out smaller.
    pub fn regenerate_power_ups(&mut self, config: &GameConfig, rng: &mut impl Rng) {
        self.power_ups.clear();
        let size = self.board_size as i32;
        if size == 0 {
            return;
        }

        let target = self.rules(config).power_up_count();
        for _ in 0..target {
            for _ in 0..config.max_placement_attempts.max(1) {
                let x = rng.gen_range(0..size);
                let y = rng.gen_range(0..size);
                if !self.power_ups.iter().any(|p| p.x == x && p.y == y) {
                    self.power_ups.push(PowerUp::new(x, y));
                    break;
                }
            }
        }
    }

    /// Apply a player's report. `Ok(true)` when it was newer than the last
    /// accepted one; older reports are dropped without error.
    pub fn apply_update(
        &mut self,
        player_id: &str,
        report: Option<&MovementReport>,
    ) -> Result<bool, SyncError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(SyncError::PlayerNotInGame)?;
        Ok(report.is_some_and(|r| player.apply(r)))
    }

    /// Latch `player_id` as the winner. Only the first win of a running
    /// game counts.
    pub fn declare_winner(&mut self, player_id: &str) -> bool {
        if self.status != LobbyStatus::Playing || self.winner.is_some() {
            return false;
        }
        let Some(player) = self.players.get_mut(player_id) else {
            return false;
        };
        player.score += 1;
        self.winner = Some(player_id.to_string());
        self.status = LobbyStatus::Finished;
        true
    }

    /// Mean tilt of every player in the roster, 0 when empty.
    pub fn mean_player_tilt(&self) -> f64 {
        if self.players.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.players.values().map(|p| p.gravity_angle).sum();
        sum / self.players.len() as f64
    }

    /// Blend the mean player tilt into the shared board tilt.
    pub fn blend_gravity(&mut self, config: &GameConfig) {
        let mean = self.mean_player_tilt();
        self.gravity_angle = config.blend_angle(self.gravity_angle, mean);
    }

    /// Give the power-up on cell `(x, y)` to `player_id` if nobody holds it.
    /// Returns whether the pickup took.
    pub fn pick_up(&mut self, x: i32, y: i32, player_id: &str, now_ms: i64) -> bool {
        let Some(power_up) = self.power_ups.iter_mut().find(|p| p.x == x && p.y == y) else {
            return false;
        };
        if power_up.holder.is_some() {
            return false;
        }
        power_up.holder = Some(player_id.to_string());
        power_up.time_activated = Some(now_ms);
        true
    }

    /// Drop expired power-ups and evict players that stopped reporting.
    pub fn collect_garbage(&mut self, now_ms: i64, config: &GameConfig) -> Collected {
        let before = self.power_ups.len();
        self.power_ups
            .retain(|p| !p.is_expired(now_ms, config.power_up_window_ms));

        let evicted: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.is_stale(now_ms, config.player_timeout_ms))
            .map(|p| p.id.clone())
            .collect();
        for id in &evicted {
            self.players.remove(id);
        }

        Collected {
            expired_power_ups: before - self.power_ups.len(),
            evicted,
        }
    }

    pub fn snapshot(&self) -> LobbyWire {
        LobbyWire {
            id: self.id.clone(),
            status: self.status,
            gravity_angle: self.gravity_angle,
            winner: self.winner.clone(),
            board_size: self.board_size,
            walls: self.walls.clone(),
            players: self
                .players
                .iter()
                .map(|(id, p)| (id.clone(), p.to_wire()))
                .collect(),
            power_ups: self.power_ups.iter().map(PowerUp::to_wire).collect(),
        }
    }
}
