use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "data/survey.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Checked in order; the first non-empty one selects PostgreSQL.
const DATABASE_URL_KEYS: &[&str] = &["EASYSURVEY_DATABASE_URL", "POSTGRES_URL", "DATABASE_URL"];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Deployment settings, read once at process start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_path: PathBuf,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = DATABASE_URL_KEYS
            .iter()
            .filter_map(|key| lookup(*key))
            .map(|v| v.trim().to_owned())
            .find(|v| !v.is_empty());

        let db_path = lookup("EASYSURVEY_DB_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let max_connections = parse_or(&lookup, "EASYSURVEY_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "EASYSURVEY_MAX_CONNECTIONS",
                value: "0".to_owned(),
            });
        }

        let connect_timeout = parse_or(&lookup, "EASYSURVEY_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?;

        Ok(Self {
            database_url,
            db_path,
            max_connections,
            connect_timeout: Duration::from_secs(connect_timeout),
        })
    }

    /// Embedded engine at `path`, everything else defaulted.
    pub fn embedded(path: impl Into<PathBuf>) -> Self {
        Self {
            database_url: None,
            db_path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}
