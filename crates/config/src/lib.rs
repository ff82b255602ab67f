//! Configuration management for toolloop
//!
//! Loads and saves the JSON configuration file. Every field has a default,
//! so a missing file or a partial file is always usable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{buckets_dir, config_path, data_dir, expand_home};

/// Environment variable consulted when no provider key is configured
pub const API_KEY_ENV: &str = "TOOLLOOP_API_KEY";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Model provider connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            region: default_region(),
            endpoint: None,
            model_id: default_model_id(),
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_model_id() -> String {
    "us.anthropic.claude-3-5-sonnet-20241022-v2:0".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

/// Conversation loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_include_history")]
    pub include_history: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_doc_dirs")]
    pub doc_dirs: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            include_history: default_include_history(),
            system_prompt: None,
            doc_dirs: default_doc_dirs(),
        }
    }
}

fn default_max_tool_rounds() -> u32 {
    5
}

fn default_include_history() -> bool {
    true
}

fn default_doc_dirs() -> Vec<String> {
    vec!["dispute_docs".to_string(), "scanline_docs".to_string()]
}

/// Object storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: String,
    #[serde(default = "default_presign_expiration")]
    pub default_presign_expiration: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            default_presign_expiration: default_presign_expiration(),
        }
    }
}

fn default_storage_root() -> String {
    "~/.toolloop/buckets".to_string()
}

fn default_presign_expiration() -> u64 {
    604_800
}

/// Dispute lookup service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeServiceConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_dispute_base_url")]
    pub base_url: String,
}

impl Default for DisputeServiceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_dispute_base_url(),
        }
    }
}

fn default_dispute_base_url() -> String {
    "https://api.sandbox.checkout.com".to_string()
}

/// Policy lookup service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyServiceConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
}

/// External REST services exposed as tools
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub dispute: DisputeServiceConfig,
    #[serde(default)]
    pub policy: PolicyServiceConfig,
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("saving config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Provider key from the file, falling back to `TOOLLOOP_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        if !self.provider.api_key.is_empty() {
            return Some(self.provider.api_key.clone());
        }
        std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn model_id(&self) -> String {
        self.provider.model_id.clone()
    }

    /// Root directory of the local object store
    pub fn storage_root(&self) -> PathBuf {
        expand_home(&self.storage.root)
    }

    pub fn dispute_api_key(&self) -> Option<String> {
        let key = &self.services.dispute.api_key;
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }

    /// Policy service is usable only with both a key and a base URL
    pub fn policy_enabled(&self) -> bool {
        !self.services.policy.api_key.is_empty() && !self.services.policy.base_url.is_empty()
    }
}

/// Write a default config unless one exists, then load it
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("config already exists at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("config written to {:?}", config_path);
    }

    let config = Config::load().await?;
    paths::ensure_dir(&config.storage_root()).await?;
    Ok(config)
}
