//! Gateway configuration loaded from a TOML file plus environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Sentinel `base_url` that routes an instance to the in-process tool server.
pub const LOCAL_INSTANCE_URL: &str = "local";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub validator: ValidatorConfig,
    pub storage: StorageConfig,
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Name this gateway answers to when no `[[instances]]` are configured.
    pub instance_name: String,
    pub trust_forwarded_for: bool,
    pub tool_timeout_secs: u64,
    pub sse_keepalive_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub keys_file: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub ip_per_minute: usize,
    pub ip_per_hour: usize,
    pub instance_per_minute: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValidatorConfig {
    pub enabled: bool,
    pub ollama_host: String,
    pub model: String,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub policy_file: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// A tenant backend: either the in-process tool server or a remote peer gateway.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub name: String,
    pub base_url: String,
    /// Outbound bearer token for remote peers. Falls back to `<NAME>_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl InstanceConfig {
    pub fn is_local(&self) -> bool {
        self.base_url == LOCAL_INSTANCE_URL
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("instance name must not be empty")]
    EmptyInstanceName,
    #[error("instance name '{0}' must not contain '-'")]
    DashInInstanceName(String),
    #[error("instance '{0}' is configured more than once")]
    DuplicateInstance(String),
    #[error("only one instance may use base_url = \"local\"")]
    MultipleLocalInstances,
    #[error("rate limit '{0}' must be greater than zero")]
    ZeroRateLimit(&'static str),
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
            log_level: "info".into(),
            instance_name: "local".into(),
            trust_forwarded_for: false,
            tool_timeout_secs: 30,
            sse_keepalive_secs: 15,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            keys_file: default_chronicle_dir()
                .join("api_keys.env")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ip_per_minute: 60,
            ip_per_hour: 500,
            instance_per_minute: 120,
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ollama_host: "http://localhost:11434".into(),
            model: "llama3.2:3b".into(),
            timeout_secs: 10,
            cache_ttl_secs: 60,
            policy_file: default_chronicle_dir()
                .join("security_policy.txt")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl ValidatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_chronicle_dir()
                .join("history.db")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            validator: ValidatorConfig::default(),
            storage: StorageConfig::default(),
            instances: Vec::new(),
        }
    }
}

/// Returns `~/.chronicle/`, or `./.chronicle/` when no home directory is known.
pub fn default_chronicle_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chronicle")
}

/// Returns the default config file path: `~/.chronicle/gateway.toml`
pub fn default_config_path() -> PathBuf {
    default_chronicle_dir().join("gateway.toml")
}

impl GatewayConfig {
    /// Load from the default path, then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path (if it exists), apply env overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            GatewayConfig::default()
        };

        config.apply_env_overrides();
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CHRONICLE_HOST") {
            self.server.host = val;
        }
        if let Some(port) = std::env::var("CHRONICLE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("CHRONICLE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("CHRONICLE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("CHRONICLE_KEYS_FILE") {
            self.auth.keys_file = val;
        }
        if let Ok(val) = std::env::var("OLLAMA_HOST") {
            self.validator.ollama_host = val;
        }
        if let Ok(val) = std::env::var("CHRONICLE_VALIDATOR_MODEL") {
            self.validator.model = val;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("ip_per_minute", self.rate_limit.ip_per_minute),
            ("ip_per_hour", self.rate_limit.ip_per_hour),
            ("instance_per_minute", self.rate_limit.instance_per_minute),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ZeroRateLimit(*name));
        }

        let mut seen = HashSet::new();
        let mut locals = 0;
        for instance in &self.instances {
            if instance.name.is_empty() {
                return Err(ConfigError::EmptyInstanceName);
            }
            if instance.name.contains('-') {
                return Err(ConfigError::DashInInstanceName(instance.name.clone()));
            }
            if !seen.insert(instance.name.as_str()) {
                return Err(ConfigError::DuplicateInstance(instance.name.clone()));
            }
            if instance.is_local() {
                locals += 1;
            }
        }
        if locals > 1 {
            return Err(ConfigError::MultipleLocalInstances);
        }
        Ok(())
    }

    /// `true` when requests fan out through the multi-instance router.
    pub fn is_multi_instance(&self) -> bool {
        !self.instances.is_empty()
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.server.tool_timeout_secs)
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn resolved_keys_file(&self) -> PathBuf {
        expand_tilde(&self.auth.keys_file)
    }

    pub fn resolved_policy_file(&self) -> PathBuf {
        expand_tilde(&self.validator.policy_file)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
