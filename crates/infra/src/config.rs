//! Configuration loading from the environment.
//!
//! | variable | default | meaning |
//! |---|---|---|
//! | `USE_PERSISTENT_STORES` | `false` | Postgres + Redis when true, in-memory otherwise |
//! | `DATABASE_URL` | required when persistent | Postgres connection string |
//! | `REDIS_URL` | `redis://localhost:6379` | Redis connection string |
//! | `HTTP_ADDR` | `0.0.0.0:8080` | API listen address |
//! | `WORKER_CONSUMER_NAME` | `worker-1` | consumer name inside each group |
//! | `WORKER_MIN_PROCESSING_MS` | `2000` | simulated processing lower bound |
//! | `WORKER_MAX_PROCESSING_MS` | `5000` | simulated processing upper bound |
//! | `WORKER_FAILURE_RATE` | `0.2` | simulated failure probability, `0..=1` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::workers::SimulationConfig;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_CONSUMER_NAME: &str = "worker-1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Where jobs and messages live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Single process; the API embeds the consumers.
    InMemory,
    Persistent {
        database_url: String,
        redis_url: String,
    },
}

impl Backend {
    pub fn is_persistent(&self) -> bool {
        matches!(self, Backend::Persistent { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub consumer_name: String,
    pub simulation: SimulationConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            simulation: SimulationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub backend: Backend,
    pub http_addr: SocketAddr,
    pub worker: WorkerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let persistent = match get("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };

        let backend = if persistent {
            Backend::Persistent {
                database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            }
        } else {
            Backend::InMemory
        };

        let http_addr = parse_or("HTTP_ADDR", get("HTTP_ADDR"), DEFAULT_HTTP_ADDR)?;

        let min_ms: u64 = parse_or("WORKER_MIN_PROCESSING_MS", get("WORKER_MIN_PROCESSING_MS"), "2000")?;
        let max_ms: u64 = parse_or("WORKER_MAX_PROCESSING_MS", get("WORKER_MAX_PROCESSING_MS"), "5000")?;
        if max_ms < min_ms {
            return Err(ConfigError::Invalid {
                var: "WORKER_MAX_PROCESSING_MS",
                value: max_ms.to_string(),
                reason: format!("must be at least WORKER_MIN_PROCESSING_MS ({min_ms})"),
            });
        }

        let failure_rate: f64 = parse_or("WORKER_FAILURE_RATE", get("WORKER_FAILURE_RATE"), "0.2")?;
        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(ConfigError::Invalid {
                var: "WORKER_FAILURE_RATE",
                value: failure_rate.to_string(),
                reason: "must be within 0..=1".to_string(),
            });
        }

        Ok(Self {
            backend,
            http_addr,
            worker: WorkerConfig {
                consumer_name: get("WORKER_CONSUMER_NAME")
                    .unwrap_or_else(|| DEFAULT_CONSUMER_NAME.to_string()),
                simulation: SimulationConfig {
                    min_processing: Duration::from_millis(min_ms),
                    max_processing: Duration::from_millis(max_ms),
                    failure_rate,
                },
            },
        })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = value.unwrap_or_else(|| default.to_string());
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })
}
