use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::uptime::UptimeStrategy;

const ENV_PREFIX: &str = "MIXNET_DIR_";

/// Configuration for the directory service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// HTTP listener
    pub server: ServerConfig,
    /// PostgreSQL connection
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Registration ceilings and version gate
    pub admission: AdmissionConfig,
    /// Reputation deltas and thresholds
    pub reputation: ReputationConfig,
    /// How report windows are sampled
    pub uptime: UptimeConfig,
    /// Topology snapshot freshness
    pub topology: TopologyConfig,
    /// Background task cadence
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,
    /// Use PostgreSQL (if false, observations and nodes live in memory)
    pub enabled: bool,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/mixnet_directory".to_string(),
            enabled: false,
            max_connections: 10,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Enable request/response span logging
    pub log_requests: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_requests: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub max_mixnodes: usize,
    pub max_gateways: usize,
    /// Exact version string a node must run to register
    pub required_version: String,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_mixnodes: 1500,
            max_gateways: 1000,
            required_version: "0.9.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Added for every "up" observation
    pub up_reward: i64,
    /// Added for every "down" observation (negative)
    pub down_penalty: i64,
    /// Minimum reputation for the active topology
    pub active_threshold: i64,
    /// Daily uptime percentage below which a node is removed
    pub eviction_threshold: u8,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            up_reward: 1,
            down_penalty: -2,
            active_threshold: 100,
            eviction_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeConfig {
    pub strategy: UptimeStrategy,
    /// Sample counts used by `UptimeStrategy::SampleCount`
    pub samples_last_5_minutes: usize,
    pub samples_last_hour: usize,
    pub samples_last_day: usize,
}

impl Default for UptimeConfig {
    fn default() -> Self {
        Self {
            strategy: UptimeStrategy::TimeWindow,
            samples_last_5_minutes: 5,
            samples_last_hour: 50,
            samples_last_day: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub cache_ttl_secs: u64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 30 }
    }
}

impl TopologyConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the background tasks at all
    pub enabled: bool,
    pub daily_refresh_interval_secs: u64,
    pub purge_interval_secs: u64,
    /// Observations older than this are deleted
    pub retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_refresh_interval_secs: 10 * 60,
            purge_interval_secs: 60 * 60,
            retention_days: 7,
        }
    }
}

impl SchedulerConfig {
    pub fn daily_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.daily_refresh_interval_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }
}

/// Overwrite `target` when `MIXNET_DIR_<key>` is set
fn override_from_env<T>(key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let name = format!("{}{}", ENV_PREFIX, key);
    if let Ok(raw) = env::var(&name) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value", name))?;
    }
    Ok(())
}

impl DirectoryConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        override_from_env("HOST", &mut config.server.host)?;
        override_from_env("PORT", &mut config.server.port)?;

        // Database configuration
        override_from_env("POSTGRES_URL", &mut config.database.url)?;
        override_from_env("POSTGRES_ENABLED", &mut config.database.enabled)?;
        override_from_env("POSTGRES_MAX_CONNECTIONS", &mut config.database.max_connections)?;
        override_from_env("POSTGRES_CONNECT_TIMEOUT_SECS", &mut config.database.connect_timeout_secs)?;

        // Logging configuration
        override_from_env("LOG_LEVEL", &mut config.logging.level)?;
        override_from_env("LOG_REQUESTS", &mut config.logging.log_requests)?;

        // Admission
        override_from_env("MAX_MIXNODES", &mut config.admission.max_mixnodes)?;
        override_from_env("MAX_GATEWAYS", &mut config.admission.max_gateways)?;
        override_from_env("REQUIRED_VERSION", &mut config.admission.required_version)?;

        // Reputation
        override_from_env("REPUTATION_UP_REWARD", &mut config.reputation.up_reward)?;
        override_from_env("REPUTATION_DOWN_PENALTY", &mut config.reputation.down_penalty)?;
        override_from_env("REPUTATION_ACTIVE_THRESHOLD", &mut config.reputation.active_threshold)?;
        override_from_env("EVICTION_THRESHOLD", &mut config.reputation.eviction_threshold)?;

        // Uptime windows
        override_from_env("UPTIME_STRATEGY", &mut config.uptime.strategy)?;
        override_from_env("UPTIME_SAMPLES_5MIN", &mut config.uptime.samples_last_5_minutes)?;
        override_from_env("UPTIME_SAMPLES_HOUR", &mut config.uptime.samples_last_hour)?;
        override_from_env("UPTIME_SAMPLES_DAY", &mut config.uptime.samples_last_day)?;

        // Topology and scheduler
        override_from_env("TOPOLOGY_TTL_SECS", &mut config.topology.cache_ttl_secs)?;
        override_from_env("SCHEDULER_ENABLED", &mut config.scheduler.enabled)?;
        override_from_env(
            "DAILY_REFRESH_INTERVAL_SECS",
            &mut config.scheduler.daily_refresh_interval_secs,
        )?;
        override_from_env("PURGE_INTERVAL_SECS", &mut config.scheduler.purge_interval_secs)?;
        override_from_env("RETENTION_DAYS", &mut config.scheduler.retention_days)?;

        if !config.database.enabled {
            warn!("PostgreSQL disabled, directory state will not survive a restart");
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.database.enabled && self.database.url.is_empty() {
            return Err(anyhow::anyhow!("PostgreSQL is enabled but no URL is configured"));
        }

        if self.admission.max_mixnodes == 0 || self.admission.max_gateways == 0 {
            return Err(anyhow::anyhow!("Node capacity ceilings must be non-zero"));
        }

        if self.admission.required_version.trim().is_empty() {
            return Err(anyhow::anyhow!("Required node version cannot be empty"));
        }

        if self.reputation.up_reward < 0 {
            return Err(anyhow::anyhow!(
                "Reputation up reward must not be negative: {}",
                self.reputation.up_reward
            ));
        }

        if self.reputation.down_penalty > 0 {
            return Err(anyhow::anyhow!(
                "Reputation down penalty must not be positive: {}",
                self.reputation.down_penalty
            ));
        }

        if self.reputation.eviction_threshold > 100 {
            return Err(anyhow::anyhow!(
                "Eviction threshold is a percentage, got {}",
                self.reputation.eviction_threshold
            ));
        }

        if self.uptime.samples_last_5_minutes == 0
            || self.uptime.samples_last_hour == 0
            || self.uptime.samples_last_day == 0
        {
            return Err(anyhow::anyhow!("Uptime sample counts must be non-zero"));
        }

        if self.scheduler.daily_refresh_interval_secs == 0 || self.scheduler.purge_interval_secs == 0 {
            return Err(anyhow::anyhow!("Scheduler intervals must be non-zero"));
        }

        if self.scheduler.retention_days == 0 {
            return Err(anyhow::anyhow!("Observation retention must be at least one day"));
        }

        Ok(())
    }
}
