//! Configuration management for block federation
//!
//! Handles configuration loading, environment overrides and validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::module::loader::locator::{default_candidate_names, CandidateName, DEFAULT_EXPOSED_PATH};
use crate::module::loader::policy::RetryPolicy;
use crate::utils::retry::RetryConfig;
use crate::utils::{env_opt, env_parse};

/// Environment variable overriding `server_url`
pub const ENV_SERVER_URL: &str = "BLOCK_FEDERATION_SERVER_URL";
/// Environment variable overriding `cache_ttl_secs`
pub const ENV_CACHE_TTL_SECS: &str = "BLOCK_FEDERATION_CACHE_TTL_SECS";
/// Environment variable overriding `registry_ttl_secs`
pub const ENV_REGISTRY_TTL_SECS: &str = "BLOCK_FEDERATION_REGISTRY_TTL_SECS";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Block server base URL
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Freshness window of loaded modules, in seconds
    #[serde(default = "default_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Freshness window of the name registry, in seconds
    #[serde(default = "default_ttl_secs")]
    pub registry_ttl_secs: u64,

    /// Retry policy for loads issued through the composition root
    #[serde(default)]
    pub retry: RetryPolicyConfig,

    /// Module discovery in the federation scope
    #[serde(default)]
    pub candidates: CandidateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            cache_ttl_secs: default_ttl_secs(),
            registry_ttl_secs: default_ttl_secs(),
            retry: RetryPolicyConfig::default(),
            candidates: CandidateConfig::default(),
            logging: None,
        }
    }
}

/// Retry policy configuration
///
/// Only transient errors (bundle executed, container not yet usable) are
/// retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl From<&RetryPolicyConfig> for RetryConfig {
    fn from(config: &RetryPolicyConfig) -> Self {
        RetryConfig {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(config: &RetryPolicyConfig) -> Self {
        RetryPolicy::new(config.into())
    }
}

/// Candidate names for one class of block identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRuleConfig {
    /// Regex over the block identifier; absent matches everything
    #[serde(default)]
    pub pattern: Option<String>,
    pub names: Vec<CandidateName>,
}

/// Module discovery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateConfig {
    /// Module path requested from each container
    #[serde(default = "default_exposed_path")]
    pub exposed_path: String,

    /// Ordered rules; the first whose pattern matches supplies the names
    #[serde(default)]
    pub rules: Vec<CandidateRuleConfig>,

    /// Names used when no rule matches
    #[serde(default = "default_candidate_names")]
    pub fallback: Vec<CandidateName>,
}

fn default_exposed_path() -> String {
    DEFAULT_EXPOSED_PATH.to_string()
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            exposed_path: default_exposed_path(),
            rules: Vec::new(),
            fallback: default_candidate_names(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Install a subscriber at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level filter (e.g., "info", "block_federation=debug")
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    #[serde(default)]
    pub filter: Option<String>,

    /// Enable JSON logging format (for log aggregation systems)
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            json_format: false,
        }
    }
}

impl FederationConfig {
    /// Load configuration from file (TOML by extension, JSON otherwise)
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;

        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse JSON config: {}", e))
        }
    }

    /// Apply `BLOCK_FEDERATION_*` environment overrides
    ///
    /// Unset, empty or unparsable variables are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(server_url) = env_opt(ENV_SERVER_URL) {
            self.server_url = server_url;
        }
        if let Some(ttl) = env_parse(ENV_CACHE_TTL_SECS) {
            self.cache_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse(ENV_REGISTRY_TTL_SECS) {
            self.registry_ttl_secs = ttl;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = reqwest::Url::parse(&self.server_url)
            .map_err(|e| anyhow::anyhow!("Invalid server_url {:?}: {}", self.server_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("server_url must be http or https, got {}", url.scheme());
        }

        if self.cache_ttl_secs == 0 {
            anyhow::bail!("cache_ttl_secs must be greater than 0");
        }
        if self.registry_ttl_secs == 0 {
            anyhow::bail!("registry_ttl_secs must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            anyhow::bail!("retry.backoff_multiplier must be at least 1.0");
        }

        if self.candidates.exposed_path.trim().is_empty() {
            anyhow::bail!("candidates.exposed_path must not be empty");
        }
        for rule in &self.candidates.rules {
            if let Some(pattern) = &rule.pattern {
                regex::Regex::new(pattern)
                    .map_err(|e| anyhow::anyhow!("Invalid candidate pattern {:?}: {}", pattern, e))?;
            }
            if rule.names.is_empty() {
                anyhow::bail!("Candidate rule {:?} has no names", rule.pattern);
            }
        }
        if self.candidates.fallback.is_empty() {
            anyhow::bail!("candidates.fallback must not be empty");
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_secs)
    }
}
