//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use commentline_core::BackoffPolicy;
use serde::Deserialize;

/// Global configuration for commentline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub youtube: YouTubeConfig,
    pub harvest: HarvestDefaults,
    pub backoff: BackoffConfig,
    pub quota: QuotaConfig,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub compression_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            compression_level: 3,
        }
    }
}

impl OutputConfig {
    pub fn comments_file(&self) -> PathBuf {
        self.dir.join("comments.jsonl")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.dir.join("checkpoints")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub api_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_url: commentline_youtube::DEFAULT_API_URL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestDefaults {
    /// 0 means unlimited
    pub max_items_per_unit: u64,
    pub units_per_query: usize,
    pub replies: String,
    pub order: String,
    pub region: Option<String>,
}

impl Default for HarvestDefaults {
    fn default() -> Self {
        Self {
            max_items_per_unit: 2000,
            units_per_query: 200,
            replies: "inline".to_string(),
            order: "relevance".to_string(),
            region: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub rate_limit_attempts: u32,
    pub transient_attempts: u32,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            base_ms: policy.base.as_millis() as u64,
            cap_ms: policy.cap.as_millis() as u64,
            rate_limit_attempts: policy.rate_limit_attempts,
            transient_attempts: policy.transient_attempts,
            jitter: policy.jitter,
        }
    }
}

impl From<BackoffConfig> for BackoffPolicy {
    fn from(c: BackoffConfig) -> Self {
        Self {
            base: Duration::from_millis(c.base_ms),
            cap: Duration::from_millis(c.cap_ms.max(c.base_ms)),
            rate_limit_attempts: c.rate_limit_attempts,
            transient_attempts: c.transient_attempts,
            jitter: c.jitter.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct QuotaConfig {
    /// Quota units this process may spend; unset means no local limit
    pub budget: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Whole-request timeout in seconds
    pub timeout: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout: 30 }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./commentline.toml (current directory)
    /// 2. ~/.config/commentline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("commentline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "commentline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output.dir, PathBuf::from("./data"));
        assert_eq!(config.output.comments_file(), PathBuf::from("./data/comments.jsonl"));
        assert_eq!(config.harvest.max_items_per_unit, 2000);
        assert_eq!(config.youtube.api_url, commentline_youtube::DEFAULT_API_URL);
        assert!(config.quota.budget.is_none());
    }

    #[test]
    fn default_backoff_matches_policy() {
        let policy: BackoffPolicy = BackoffConfig::default().into();
        let expected = BackoffPolicy::default();
        assert_eq!(policy.base, expected.base);
        assert_eq!(policy.cap, expected.cap);
        assert_eq!(policy.rate_limit_attempts, 5);
        assert_eq!(policy.transient_attempts, 3);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("COMMENTLINE_TEST_KEY", "test_value");
        assert_eq!(
            expand_env_var("${COMMENTLINE_TEST_KEY}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("COMMENTLINE_TEST_KEY");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[output]
dir = "/tmp/yt"
compression_level = 5

[harvest]
max_items_per_unit = 0
replies = "full"
region = "DE"

[backoff]
base_ms = 200
cap_ms = 100

[quota]
budget = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("/tmp/yt"));
        assert_eq!(config.output.compression_level, 5);
        assert_eq!(config.harvest.max_items_per_unit, 0);
        assert_eq!(config.harvest.replies, "full");
        assert_eq!(config.harvest.region.as_deref(), Some("DE"));
        assert_eq!(config.quota.budget, Some(9000));

        // cap never below base
        let policy: BackoffPolicy = config.backoff.into();
        assert_eq!(policy.cap, Duration::from_millis(200));
    }
}
