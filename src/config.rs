use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_VENUE: &str = "OSTIUM";
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CLOSING_GRACE_SECS: u64 = 900;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub venue_api_url: String,
    pub venue: String,
    pub lock_timeout: Duration,
    pub closing_grace: Duration,
    pub capital_policy: CapitalPolicy,
    pub lock_owner: String,
}

/// What to do when a position's capital cannot be resolved from the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapitalPolicy {
    /// Count the position's capital as 0, which drops it from weighted sums.
    ExcludeAsZero,
    /// Fail the agent's metrics pass; the stored metrics row is left as it was.
    FailAgent,
}

/// Settings the reconciliation pass itself needs.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub venue: String,
    pub lock_timeout: Duration,
    pub closing_grace: Duration,
    pub capital_policy: CapitalPolicy,
    pub lock_owner: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            venue: DEFAULT_VENUE.to_string(),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            closing_grace: Duration::from_secs(DEFAULT_CLOSING_GRACE_SECS),
            capital_policy: CapitalPolicy::ExcludeAsZero,
            lock_owner: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = required(&env_map, "DATABASE_PATH")?;
        let venue_api_url = required(&env_map, "VENUE_API_URL")?;

        let venue = env_map
            .get("VENUE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_VENUE.to_string());

        let lock_timeout = parse_secs(&env_map, "LOCK_TIMEOUT_SECS", DEFAULT_LOCK_TIMEOUT_SECS)?;
        let closing_grace =
            parse_secs(&env_map, "CLOSING_GRACE_SECS", DEFAULT_CLOSING_GRACE_SECS)?;

        let capital_policy = match env_map
            .get("CAPITAL_FAILURE_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("exclude")
        {
            "exclude" => CapitalPolicy::ExcludeAsZero,
            "fail-agent" => CapitalPolicy::FailAgent,
            other => {
                return Err(ConfigError::InvalidValue(
                    "CAPITAL_FAILURE_POLICY".to_string(),
                    format!("must be exclude or fail-agent, got {}", other),
                ))
            }
        };

        let lock_owner = env_map
            .get("LOCK_OWNER")
            .cloned()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Config {
            database_path,
            venue_api_url,
            venue,
            lock_timeout,
            closing_grace,
            capital_policy,
            lock_owner,
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            venue: self.venue.clone(),
            lock_timeout: self.lock_timeout,
            closing_grace: self.closing_grace,
            capital_policy: self.capital_policy,
            lock_owner: self.lock_owner.clone(),
        }
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_secs(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match env_map.get(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(key.to_string(), "must be a positive integer".to_string())
            }),
    }
}
