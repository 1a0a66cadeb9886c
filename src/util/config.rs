use std::path::PathBuf;
use std::time::Duration;

use ::config::{Config, Environment};
use derive_more::derive::Display;
use serde::Deserialize;

use super::script::ScriptLimits;

#[derive(Debug, Display)]
pub enum ConfigError {
    #[display("{_0} must be set")]
    Missing(&'static str),

    #[display("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },

    #[display("{_0}")]
    Source(::config::ConfigError),
}

impl std::error::Error for ConfigError {}

impl From<::config::ConfigError> for ConfigError {
    fn from(e: ::config::ConfigError) -> Self {
        ConfigError::Source(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { database_url: String },
    Memory { seed_file: Option<PathBuf> },
}

/// Service settings, read once at startup from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageBackend,
    pub bind_addr: String,
    /// SHA-256 hex digests of the accepted API keys.
    pub api_key_digests: Vec<String>,
    pub cors_origins: Vec<String>,
    pub script_interpreter: String,
    pub script_args: Vec<String>,
    pub script_limits: ScriptLimits,
    pub scoreboard_ttl: Duration,
}

/// Environment as read, one field per variable (`SCRIPT_TIMEOUT_SECS` ->
/// `script_timeout_secs`).
#[derive(Debug, Deserialize)]
struct EnvConfig {
    storage_backend: String,
    database_url: Option<String>,
    memory_seed_file: Option<String>,
    bind_addr: String,
    api_keys: Option<String>,
    cors_origins: Option<String>,
    script_interpreter: String,
    script_args: String,
    script_timeout_secs: u64,
    script_memory_limit_kb: Option<u64>,
    script_max_output_bytes: usize,
    scoreboard_cache_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::default())
    }

    fn load(env: Environment) -> Result<Self, ConfigError> {
        let raw: EnvConfig = Config::builder()
            .set_default("storage_backend", "postgres")?
            .set_default("bind_addr", "0.0.0.0:9000")?
            .set_default("script_interpreter", "python3")?
            .set_default("script_args", "-")?
            .set_default("script_timeout_secs", 10_i64)?
            .set_default("script_max_output_bytes", 1024 * 1024_i64)?
            .set_default("scoreboard_cache_secs", 5_i64)?
            .add_source(env.ignore_empty(true))
            .build()?
            .try_deserialize()?;

        raw.try_into()
    }
}

impl TryFrom<EnvConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(raw: EnvConfig) -> Result<Self, Self::Error> {
        let storage = match raw.storage_backend.trim() {
            "postgres" => StorageBackend::Postgres {
                database_url: raw
                    .database_url
                    .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            },
            "memory" => StorageBackend::Memory {
                seed_file: raw.memory_seed_file.map(PathBuf::from),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let api_key_digests = list(raw.api_keys)
            .into_iter()
            .map(|digest| {
                let lower = digest.to_ascii_lowercase();
                if lower.len() == 64 && hex::decode(&lower).is_ok() {
                    Ok(lower)
                } else {
                    Err(ConfigError::Invalid {
                        key: "API_KEYS",
                        value: digest,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            storage,
            bind_addr: raw.bind_addr,
            api_key_digests,
            cors_origins: list(raw.cors_origins),
            script_interpreter: raw.script_interpreter,
            script_args: raw
                .script_args
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            script_limits: ScriptLimits {
                timeout: Duration::from_secs(raw.script_timeout_secs),
                max_output_bytes: raw.script_max_output_bytes,
                memory_limit_kb: raw.script_memory_limit_kb,
            },
            scoreboard_ttl: Duration::from_secs(raw.scoreboard_cache_secs),
        })
    }
}

fn list(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
