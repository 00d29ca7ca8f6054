use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const BPS_DENOMINATOR: i64 = 10_000;

#[derive(Debug)]
pub enum ConfigError {
    Missing(String),
    Invalid { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} environment variable must be set", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "Invalid value for {}: {}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Tunables for the session engine, read from the environment once at
/// process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub platform_fee_bps: i64,
    pub clock_persist_interval: Duration,
    pub session_poll_interval: Duration,
    pub room_poll_interval: Duration,
    pub max_conflict_retries: u32,
    pub low_time_threshold: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            platform_fee_bps: 1_000,
            clock_persist_interval: Duration::from_secs(5),
            session_poll_interval: Duration::from_secs(3),
            room_poll_interval: Duration::from_secs(3),
            max_conflict_retries: 5,
            low_time_threshold: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            platform_fee_bps: parse_or(&lookup, "PLATFORM_FEE_BPS", defaults.platform_fee_bps)?,
            clock_persist_interval: Duration::from_secs(parse_or(
                &lookup,
                "CLOCK_PERSIST_INTERVAL_SECS",
                defaults.clock_persist_interval.as_secs(),
            )?),
            session_poll_interval: Duration::from_secs(parse_or(
                &lookup,
                "SESSION_POLL_INTERVAL_SECS",
                defaults.session_poll_interval.as_secs(),
            )?),
            room_poll_interval: Duration::from_secs(parse_or(
                &lookup,
                "ROOM_POLL_INTERVAL_SECS",
                defaults.room_poll_interval.as_secs(),
            )?),
            max_conflict_retries: parse_or(
                &lookup,
                "MAX_CONFLICT_RETRIES",
                defaults.max_conflict_retries,
            )?,
            low_time_threshold: Duration::from_secs(parse_or(
                &lookup,
                "LOW_TIME_THRESHOLD_SECS",
                defaults.low_time_threshold.as_secs(),
            )?),
        };

        if !(0..=BPS_DENOMINATOR).contains(&config.platform_fee_bps) {
            return Err(ConfigError::Invalid {
                key: "PLATFORM_FEE_BPS".to_string(),
                value: config.platform_fee_bps.to_string(),
            });
        }

        Ok(config)
    }
}

/// DynamoDB table names, one per record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub sessions: String,
    pub moves: String,
    pub rooms: String,
    pub accounts: String,
    /// Per-player settlement receipts, keyed by player and session id.
    pub settlements: String,
    pub fees: String,
}

impl TableNames {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| ConfigError::Missing(key.to_string()));
        Ok(TableNames {
            sessions: required("GAME_SESSIONS_TABLE")?,
            moves: required("GAME_MOVES_TABLE")?,
            rooms: required("GAME_ROOMS_TABLE")?,
            accounts: required("PLAYER_ACCOUNTS_TABLE")?,
            settlements: required("PLAYER_SETTLEMENTS_TABLE")?,
            fees: required("PLATFORM_FEES_TABLE")?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
