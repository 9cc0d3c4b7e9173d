/// Game rules shared by the server and every client.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    /// Maze width and height in cells
    pub board_size: usize,
    pub max_players: usize,
    /// How far into the future a fresh player's `lastPoll` is set (ms)
    #[ts(type = "number")]
    pub join_grace_ms: i64,
    /// Inactivity after which a player is evicted (ms)
    #[ts(type = "number")]
    pub player_timeout_ms: i64,
    /// Lifetime of a held power-up (ms)
    #[ts(type = "number")]
    pub power_up_window_ms: i64,
    /// EMA weight given to the mean player tilt on each accepted poll
    pub gravity_blend: f64,
    /// One power-up per this many cells
    pub power_up_density: usize,
    /// Chance of clearing each interior wall flag after carving
    pub wall_removal_chance: f64,
    /// Retries per power-up before settling for fewer
    pub max_placement_attempts: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_size: 12,
            max_players: 4,
            join_grace_ms: 10_000,
            player_timeout_ms: 10_000,
            power_up_window_ms: 7_500,
            gravity_blend: 0.2,
            power_up_density: 32,
            wall_removal_chance: 0.1,
            max_placement_attempts: 16,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.board_size == 0 || self.board_size > 256 {
            return Err("board_size must be in 1..=256".to_string());
        }
        if self.max_players == 0 {
            return Err("max_players must be > 0".to_string());
        }
        if self.join_grace_ms < 0 {
            return Err("join_grace_ms must be >= 0".to_string());
        }
        if self.player_timeout_ms <= 0 {
            return Err("player_timeout_ms must be > 0".to_string());
        }
        if self.power_up_window_ms <= 0 {
            return Err("power_up_window_ms must be > 0".to_string());
        }
        if !self.gravity_blend.is_finite() || self.gravity_blend <= 0.0 || self.gravity_blend > 1.0 {
            return Err("gravity_blend must be in (0, 1]".to_string());
        }
        if self.power_up_density == 0 {
            return Err("power_up_density must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.wall_removal_chance) {
            return Err("wall_removal_chance must be in [0, 1]".to_string());
        }
        Ok(())
    }

    /// Number of power-ups placed on a fresh board.
    pub fn power_up_count(&self) -> usize {
        self.board_size * self.board_size / self.power_up_density
    }

    /// Number of exits punched into the bottom edge of a fresh maze.
    pub fn exit_count(&self) -> usize {
        self.board_size / 4
    }

    /// Blend one sample into a running angle: `current * (1 - w) + sample * w`.
    ///
    /// The server uses this for the shared board tilt; clients use it to
    /// smooth the rotation they render.
    pub fn blend_angle(&self, current: f64, sample: f64) -> f64 {
        current * (1.0 - self.gravity_blend) + sample * self.gravity_blend
    }
}
