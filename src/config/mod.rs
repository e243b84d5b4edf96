//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables.
///
/// Every gameplay constant has a code default so the server runs with no
/// environment at all; variables only override.
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Bullet travel speed (units per second)
    pub bullet_speed: f32,
    /// Maximum bullet travel distance (units)
    pub bullet_max_distance: f32,
    /// Minimum spacing between accepted shots (ms)
    pub weapon_cooldown_ms: u64,
    /// Reload timer duration (ms)
    pub reload_duration_ms: u64,
    /// Magazine capacity (rounds)
    pub magazine_capacity: u32,
    /// Minimum spacing between accepted position updates (ms)
    pub update_min_interval_ms: u64,

    /// Half-extent of the free-roam town square
    pub town_half_extent: f32,
    /// Half-extent of the shootout map square
    pub shootout_half_extent: f32,

    /// Number of concurrent quick-draw arenas
    pub arena_count: usize,
    /// Fixed delay between the ready cue and the countdown cue (ms)
    pub duel_cue_delay_ms: u64,
    /// Draw-signal window lower bound (ms)
    pub draw_min_ms: u64,
    /// Draw-signal window upper bound (ms)
    pub draw_max_ms: u64,

    /// Shootout lobby capacity
    pub shootout_capacity: usize,
    /// Kills required to win a shootout
    pub shootout_win_score: u32,

    /// Heartbeat sweep period (ms)
    pub heartbeat_interval_ms: u64,
    /// Silence threshold before a connection is reaped (ms)
    pub connection_timeout_ms: u64,
    /// Bullet simulation tick period (ms)
    pub physics_tick_ms: u64,
    /// Delay between death and respawn (ms)
    pub respawn_delay_ms: u64,

    /// Consumed nonces retained per player
    pub nonce_retention: usize,

    /// Damage applied per hit zone
    pub damage_head: i32,
    pub damage_body: i32,
    pub damage_limbs: i32,
    /// Player hitbox cylinder radius
    pub hitbox_radius: f32,
    /// Player hitbox cylinder height
    pub hitbox_height: f32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render-style PORT takes precedence, then SERVER_ADDR, then default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            bullet_speed: var_or("BULLET_SPEED", 80.0)?,
            bullet_max_distance: var_or("BULLET_MAX_DISTANCE", 100.0)?,
            weapon_cooldown_ms: var_or("WEAPON_COOLDOWN_MS", 250)?,
            reload_duration_ms: var_or("RELOAD_DURATION_MS", 2000)?,
            magazine_capacity: var_or("MAGAZINE_CAPACITY", 6)?,
            update_min_interval_ms: var_or("UPDATE_MIN_INTERVAL_MS", 30)?,

            town_half_extent: var_or("TOWN_HALF_EXTENT", 70.0)?,
            shootout_half_extent: var_or("SHOOTOUT_HALF_EXTENT", 40.0)?,

            arena_count: var_or("ARENA_COUNT", 2)?,
            duel_cue_delay_ms: var_or("DUEL_CUE_DELAY_MS", 1000)?,
            draw_min_ms: var_or("DRAW_MIN_MS", 1500)?,
            draw_max_ms: var_or("DRAW_MAX_MS", 7000)?,

            shootout_capacity: var_or("SHOOTOUT_CAPACITY", 8)?,
            shootout_win_score: var_or("SHOOTOUT_WIN_SCORE", 10)?,

            heartbeat_interval_ms: var_or("HEARTBEAT_INTERVAL_MS", 5000)?,
            connection_timeout_ms: var_or("CONNECTION_TIMEOUT_MS", 15000)?,
            physics_tick_ms: var_or("PHYSICS_TICK_MS", 16)?,
            respawn_delay_ms: var_or("RESPAWN_DELAY_MS", 1500)?,

            nonce_retention: var_or("NONCE_RETENTION", 128)?,

            damage_head: var_or("DAMAGE_HEAD", 100)?,
            damage_body: var_or("DAMAGE_BODY", 35)?,
            damage_limbs: var_or("DAMAGE_LIMBS", 20)?,
            hitbox_radius: var_or("HITBOX_RADIUS", 0.6)?,
            hitbox_height: var_or("HITBOX_HEIGHT", 1.8)?,
        })
    }
}

/// Parse an environment variable, falling back to a default when unset
fn var_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_env() {
        let config = Config::from_env().expect("defaults must parse");
        assert_eq!(config.magazine_capacity, 6);
        assert_eq!(config.damage_head, 100);
        assert!(config.draw_min_ms < config.draw_max_ms);
    }
}
