//! Server and simulation configuration
//!
//! Defaults reproduce the classic arena: an 800x600 field simulated at 30Hz,
//! 20px player radius, 200px/s movement and 400px/s bullets that live for
//! three seconds.

use shared::{DEFAULT_MAX_FRAME_LEN, DEFAULT_PORT};
use std::time::Duration;
use thiserror::Error;

/// Highest accepted simulation rate
pub const MAX_TICK_RATE: u32 = 1000;

/// Where dead players come back
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnMode {
    /// Always the same point (nudged aside if a live player stands exactly on it)
    Fixed { x: f32, y: f32 },
    /// Uniformly random inside the arena
    Random,
}

/// Tunables for the simulation engine
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub arena_width: f32,
    pub arena_height: f32,
    /// Simulation ticks per second
    pub tick_rate: u32,
    pub player_radius: f32,
    /// Maximum player speed in px/s
    pub max_speed: f32,
    /// Bullet speed in px/s
    pub bullet_speed: f32,
    pub bullet_lifetime: Duration,
    pub max_ammo: u32,
    /// Points awarded to the shooter per hit
    pub hit_score: u32,
    pub respawn_delay: Duration,
    /// Ticks a player sits out after each shot; 0 allows a shot every tick
    pub fire_cooldown_ticks: u32,
    pub spawn_mode: SpawnMode,
    /// Seed for spawn randomization; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            arena_width: 800.0,
            arena_height: 600.0,
            tick_rate: 30,
            player_radius: 20.0,
            max_speed: 200.0,
            bullet_speed: 400.0,
            bullet_lifetime: Duration::from_secs(3),
            max_ammo: 10,
            hit_score: 1,
            respawn_delay: Duration::from_secs(3),
            fire_cooldown_ticks: 0,
            spawn_mode: SpawnMode::Fixed { x: 400.0, y: 300.0 },
            seed: None,
        }
    }
}

impl GameConfig {
    /// Fixed simulation step in seconds
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn bullet_lifetime_ticks(&self) -> u32 {
        self.duration_to_ticks(self.bullet_lifetime)
    }

    pub fn respawn_ticks(&self) -> u32 {
        self.duration_to_ticks(self.respawn_delay)
    }

    fn duration_to_ticks(&self, duration: Duration) -> u32 {
        let ticks = (duration.as_secs_f64() * self.tick_rate as f64).round();
        (ticks as u32).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(ConfigError::TickRate);
        }
        if !(self.player_radius.is_finite() && self.player_radius > 0.0) {
            return Err(ConfigError::PlayerRadius);
        }
        let diameter = self.player_radius * 2.0;
        if !(self.arena_width.is_finite() && self.arena_height.is_finite())
            || self.arena_width <= diameter
            || self.arena_height <= diameter
        {
            return Err(ConfigError::ArenaSize {
                width: self.arena_width,
                height: self.arena_height,
            });
        }
        for (name, value) in [
            ("max_speed", self.max_speed),
            ("bullet_speed", self.bullet_speed),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Speed(name));
            }
        }
        if let SpawnMode::Fixed { x, y } = self.spawn_mode {
            if !(x.is_finite() && y.is_finite()) {
                return Err(ConfigError::SpawnPoint);
            }
        }
        Ok(())
    }
}

/// Network-facing settings plus the simulation config
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_players: usize,
    /// How long a fresh connection has to send JOIN
    pub handshake_timeout: Duration,
    /// STATE frames buffered per client before it is dropped as too slow
    pub outbound_queue: usize,
    pub max_frame_len: usize,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            max_players: 16,
            handshake_timeout: Duration::from_secs(5),
            outbound_queue: 64,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_players == 0 {
            return Err(ConfigError::MaxPlayers);
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::OutboundQueue);
        }
        self.game.validate()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tick rate must be between 1 and {}", MAX_TICK_RATE)]
    TickRate,

    #[error("player radius must be positive")]
    PlayerRadius,

    #[error("arena {width}x{height} is too small for a player")]
    ArenaSize { width: f32, height: f32 },

    #[error("{0} must be a non-negative number")]
    Speed(&'static str),

    #[error("spawn point must be finite")]
    SpawnPoint,

    #[error("max players must be at least 1")]
    MaxPlayers,

    #[error("outbound queue must hold at least one frame")]
    OutboundQueue,
}
