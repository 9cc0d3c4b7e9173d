use marble_maze_shared::config::GameConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Seed for lobby ids, mazes and power-ups. Entropy when unset.
    pub rng_seed: Option<u64>,
    /// How often the lobby loop looks for idle lobbies (ms)
    pub reap_interval_ms: u64,
    /// Empty lobbies untouched for this long are removed. `None` keeps
    /// every lobby for the life of the process.
    pub lobby_idle_ttl_ms: Option<i64>,
    /// Capacity of the handler → lobby loop channel
    pub command_buffer: usize,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3030".to_string(),
            rng_seed: None,
            reap_interval_ms: 60_000,
            lobby_idle_ttl_ms: Some(30 * 60 * 1000),
            command_buffer: 256,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `MAZE_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(addr) = lookup("MAZE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(seed) = lookup("MAZE_RNG_SEED") {
            let seed: u64 = seed
                .parse()
                .map_err(|_| format!("MAZE_RNG_SEED is not a u64: {seed}"))?;
            config.rng_seed = Some(seed);
        }
        if let Some(size) = lookup("MAZE_BOARD_SIZE") {
            config.game.board_size = size
                .parse()
                .map_err(|_| format!("MAZE_BOARD_SIZE is not a number: {size}"))?;
        }
        if let Some(ttl) = lookup("MAZE_LOBBY_TTL_MS") {
            // 0 disables reaping
            let ttl: i64 = ttl
                .parse()
                .map_err(|_| format!("MAZE_LOBBY_TTL_MS is not a number: {ttl}"))?;
            config.lobby_idle_ttl_ms = (ttl > 0).then_some(ttl);
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.reap_interval_ms == 0 {
            return Err("reap_interval_ms must be > 0".to_string());
        }
        if matches!(self.lobby_idle_ttl_ms, Some(ttl) if ttl <= 0) {
            return Err("lobby_idle_ttl_ms must be > 0 when set".to_string());
        }
        if self.command_buffer == 0 {
            return Err("command_buffer must be > 0".to_string());
        }
        self.game.validate()
    }
}
