//! Configuration loading from environment variables.
//!
//! `main` calls `dotenvy::dotenv()` first, so a `.env` file works too.

use chrono::Duration;
use chrono_tz::Tz;
use std::path::PathBuf;

/// Which backend holds the active and archived raids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Redis(String),
    Postgres(String),
    Memory,
}

/// Durations that drive the raid lifecycle.
#[derive(Debug, Clone)]
pub struct Timings {
    /// How often the lifecycle sweep runs.
    pub sweep_interval: std::time::Duration,
    /// Grace period after a start time passes before the start window is cleared.
    pub start_clear: Duration,
    /// Delay between the expiry warning and the channel being deleted.
    pub deletion_warning: Duration,
    /// Hard cutoff for a raid, counted from creation.
    pub default_raid_duration: Duration,
    /// How long a hatched egg stays available.
    pub hatched_egg_duration: Duration,
    /// How long to wait for a completion reply.
    pub complete_timeout: std::time::Duration,
    /// Zone used when printing times to members.
    pub timezone: Tz,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            sweep_interval: std::time::Duration::from_secs(60),
            start_clear: Duration::minutes(5),
            deletion_warning: Duration::minutes(15),
            default_raid_duration: Duration::minutes(120),
            hatched_egg_duration: Duration::minutes(45),
            complete_timeout: std::time::Duration::from_secs(15 * 60),
            timezone: chrono_tz::Europe::Warsaw,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub guild_id: u64,
    pub store: StoreBackend,
    pub venues_path: PathBuf,
    pub timings: Timings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DISCORD_TOKEN`
    /// - `GUILD_ID`
    ///
    /// Optional (with defaults):
    /// - `RAID_STORE`: `redis` | `postgres` | `memory` (default: redis)
    /// - `REDIS_URL` (default: redis://127.0.0.1:6379), `DATABASE_URL` for postgres
    /// - `VENUES_PATH` (default: data/venues.json)
    /// - `RAID_TIMEZONE` (default: Europe/Warsaw)
    /// - `RAID_SWEEP_INTERVAL_SECS`, `RAID_START_CLEAR_MINUTES`,
    ///   `RAID_DELETION_WARNING_MINUTES`, `RAID_DEFAULT_DURATION_MINUTES`,
    ///   `RAID_HATCHED_EGG_DURATION_MINUTES`, `RAID_COMPLETE_TIMEOUT_MINUTES`
    pub fn from_env() -> Result<Self, ConfigError> {
        let discord_token =
            std::env::var("DISCORD_TOKEN").map_err(|_| ConfigError::Missing("DISCORD_TOKEN"))?;
        let guild_id = std::env::var("GUILD_ID")
            .map_err(|_| ConfigError::Missing("GUILD_ID"))?
            .parse()
            .map_err(|_| ConfigError::Invalid("GUILD_ID", "must be a numeric guild id"))?;

        let store = match std::env::var("RAID_STORE")
            .unwrap_or_else(|_| "redis".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "redis" => StoreBackend::Redis(
                std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            ),
            "postgres" => StoreBackend::Postgres(
                std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            ),
            "memory" => StoreBackend::Memory,
            _ => {
                return Err(ConfigError::Invalid(
                    "RAID_STORE",
                    "must be one of redis, postgres, memory",
                ))
            }
        };

        let venues_path = std::env::var("VENUES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/venues.json"));

        Ok(Self {
            discord_token,
            guild_id,
            store,
            venues_path,
            timings: Timings::from_env()?,
        })
    }
}

impl Timings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Timings::default();
        let timezone = match std::env::var("RAID_TIMEZONE") {
            Ok(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::Invalid("RAID_TIMEZONE", "must be an IANA zone name"))?,
            Err(_) => defaults.timezone,
        };

        Ok(Self {
            sweep_interval: std::time::Duration::from_secs(env_u32(
                "RAID_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs() as u32,
            )?
            .max(1) as u64),
            start_clear: Duration::minutes(env_u32(
                "RAID_START_CLEAR_MINUTES",
                defaults.start_clear.num_minutes() as u32,
            )? as i64),
            deletion_warning: Duration::minutes(env_u32(
                "RAID_DELETION_WARNING_MINUTES",
                defaults.deletion_warning.num_minutes() as u32,
            )? as i64),
            default_raid_duration: Duration::minutes(env_u32(
                "RAID_DEFAULT_DURATION_MINUTES",
                defaults.default_raid_duration.num_minutes() as u32,
            )? as i64),
            hatched_egg_duration: Duration::minutes(env_u32(
                "RAID_HATCHED_EGG_DURATION_MINUTES",
                defaults.hatched_egg_duration.num_minutes() as u32,
            )? as i64),
            complete_timeout: std::time::Duration::from_secs(
                env_u32(
                    "RAID_COMPLETE_TIMEOUT_MINUTES",
                    (defaults.complete_timeout.as_secs() / 60) as u32,
                )? as u64
                    * 60,
            ),
            timezone,
        })
    }
}

fn env_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serializes tests that touch the process environment
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                match value {
                    Some(v) => env::set_var(&key, v),
                    None => env::remove_var(&key),
                }
            }
        }
    }

    const TIMING_KEYS: [&str; 7] = [
        "RAID_SWEEP_INTERVAL_SECS",
        "RAID_START_CLEAR_MINUTES",
        "RAID_DELETION_WARNING_MINUTES",
        "RAID_DEFAULT_DURATION_MINUTES",
        "RAID_HATCHED_EGG_DURATION_MINUTES",
        "RAID_COMPLETE_TIMEOUT_MINUTES",
        "RAID_TIMEZONE",
    ];

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("DISCORD_TOKEN", "token");
        guard.set("GUILD_ID", "42");
        guard.remove("RAID_STORE");
        guard.remove("REDIS_URL");
        guard.remove("VENUES_PATH");
        for key in TIMING_KEYS {
            guard.remove(key);
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.guild_id, 42);
        assert_eq!(
            config.store,
            StoreBackend::Redis("redis://127.0.0.1:6379".to_string())
        );
        assert_eq!(config.venues_path, PathBuf::from("data/venues.json"));
        assert_eq!(config.timings.start_clear, Duration::minutes(5));
        assert_eq!(config.timings.deletion_warning, Duration::minutes(15));
        assert_eq!(config.timings.sweep_interval.as_secs(), 60);
    }

    #[test]
    fn test_config_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("DISCORD_TOKEN", "token");
        guard.set("GUILD_ID", "42");
        guard.set("RAID_STORE", "memory");
        guard.set("RAID_DELETION_WARNING_MINUTES", "3");
        guard.set("RAID_COMPLETE_TIMEOUT_MINUTES", "2");
        guard.set("RAID_TIMEZONE", "America/New_York");

        let config = Config::from_env().unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.timings.deletion_warning, Duration::minutes(3));
        assert_eq!(config.timings.complete_timeout.as_secs(), 120);
        assert_eq!(config.timings.timezone, chrono_tz::America::New_York);
    }

    #[test]
    fn test_config_missing_token() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.remove("DISCORD_TOKEN");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DISCORD_TOKEN")));
    }

    #[test]
    fn test_config_invalid_duration() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("DISCORD_TOKEN", "token");
        guard.set("GUILD_ID", "42");
        guard.set("RAID_START_CLEAR_MINUTES", "soon");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("RAID_START_CLEAR_MINUTES", _)
        ));
    }

    #[test]
    fn test_config_unknown_store() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("DISCORD_TOKEN", "token");
        guard.set("GUILD_ID", "42");
        guard.set("RAID_STORE", "floppy");

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("RAID_STORE", _)
        ));
    }
}
