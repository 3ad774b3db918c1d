use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::error::StoreError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub mongo: MongoConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub existence: ExistenceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PostgresConfig {
    /// PostgreSQL connection URL. Without it every relational operation
    /// fails with `PoolUnavailable`.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Retries after the first failed acquisition
    pub acquire_retries: u32,
    /// Delay unit; the n-th retry waits `n * retry_base_delay_ms`
    pub retry_base_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            acquire_timeout_ms: 5000,
            acquire_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MongoConfig {
    pub url: Option<String>,
    pub database: String,
    pub collection: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: "favorites".to_string(),
            collection: "favorites".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Background repair worker pool
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RepairConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub task_timeout_secs: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_size: 1024,
            task_timeout_secs: 30,
        }
    }
}

impl RepairConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// Asset/user existence probes
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExistenceConfig {
    /// Overall retry budget for one lookup
    pub attempts: u32,
    pub attempt_timeout_ms: u64,
    pub remote_asset_urls: Vec<String>,
    pub remote_user_urls: Vec<String>,
}

impl Default for ExistenceConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout_ms: 2000,
            remote_asset_urls: Vec::new(),
            remote_user_urls: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, StoreError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(path: &str) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("Failed to read {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))
    }
}
