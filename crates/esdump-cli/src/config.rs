//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use esdump_core::{ExportConfig, RetryPolicy, SliceMode};
use esdump_elastic::ElasticConfig;
use serde::Deserialize;

/// File configuration for esdump
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub elasticsearch: ElasticSection,
    pub export: ExportSection,
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElasticSection {
    pub url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub password: Option<String>,
    pub insecure: bool,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub scroll_keepalive: String,
    pub pool_size: usize,
}

impl Default for ElasticSection {
    fn default() -> Self {
        let d = ElasticConfig::default();
        Self {
            url: d.url,
            username: None,
            password: None,
            insecure: d.insecure,
            request_timeout_secs: d.request_timeout.as_secs(),
            connect_timeout_secs: d.connect_timeout.as_secs(),
            scroll_keepalive: d.scroll_keepalive,
            pool_size: d.pool_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub output_dir: PathBuf,
    /// `auto` or a positive slice count
    pub slices: String,
    pub max_slices: u32,
    pub min_docs_per_slice: u64,
    pub page_size: u32,
    pub concurrency: usize,
    pub combine: bool,
    pub keep_slices: bool,
    pub compression_level: u32,
}

impl Default for ExportSection {
    fn default() -> Self {
        let d = ExportConfig::default();
        Self {
            output_dir: d.output_dir,
            slices: d.slices.to_string(),
            max_slices: d.max_slices,
            min_docs_per_slice: d.min_docs_per_slice,
            page_size: d.page_size,
            concurrency: d.concurrency,
            combine: d.combine,
            keep_slices: d.keep_slices,
            compression_level: d.compression_level,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub jitter: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let d = RetryPolicy::default();
        Self {
            max_retries: d.max_retries,
            base_delay_ms: d.base_delay.as_millis() as u64,
            max_delay_secs: d.max_delay.as_secs(),
            jitter: d.jitter,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            jitter: self.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Parse `auto` or a positive slice count
pub fn parse_slice_mode(s: &str) -> Result<SliceMode, String> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(SliceMode::Auto);
    }
    match s.parse::<u32>() {
        Ok(0) => Err("slice count must be at least 1".to_string()),
        Ok(n) => Ok(SliceMode::Fixed(n)),
        Err(_) => Err(format!("expected 'auto' or a positive integer, got '{s}'")),
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
    /// 1. ./esdump.toml (current directory)
    /// 2. ~/.config/esdump/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("esdump.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "esdump") {
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
        assert_eq!(config.elasticsearch.url, "http://localhost:9200");
        assert_eq!(config.elasticsearch.scroll_keepalive, "5m");
        assert_eq!(config.export.slices, "auto");
        assert_eq!(config.export.page_size, 5_000);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("ESDUMP_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${ESDUMP_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("ESDUMP_TEST_VAR");
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
[elasticsearch]
url = "https://es.internal:9200"
username = "exporter"
password = "${ESDUMP_UNSET_PASSWORD_VAR}"
request_timeout_secs = 60

[export]
output_dir = "/tmp/dump"
slices = "8"
combine = true

[retry]
max_retries = 2
base_delay_ms = 500
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.elasticsearch.url, "https://es.internal:9200");
        assert_eq!(config.elasticsearch.username.as_deref(), Some("exporter"));
        assert_eq!(config.elasticsearch.password, None);
        assert_eq!(config.elasticsearch.request_timeout_secs, 60);
        assert_eq!(config.elasticsearch.scroll_keepalive, "5m");
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/dump"));
        assert_eq!(parse_slice_mode(&config.export.slices), Ok(SliceMode::Fixed(8)));
        assert!(config.export.combine);
        assert!(!config.export.keep_slices);

        let policy = config.retry.policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn unknown_section_fields_ignored() {
        let config: Config = toml::from_str("[export]\nfuture_option = 1\n").unwrap();
        assert_eq!(config.export.page_size, 5_000);
    }

    #[test]
    fn slice_mode_parsing() {
        assert_eq!(parse_slice_mode("auto"), Ok(SliceMode::Auto));
        assert_eq!(parse_slice_mode("AUTO"), Ok(SliceMode::Auto));
        assert_eq!(parse_slice_mode("16"), Ok(SliceMode::Fixed(16)));
        assert!(parse_slice_mode("0").is_err());
        assert!(parse_slice_mode("-3").is_err());
        assert!(parse_slice_mode("many").is_err());
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("esdump.toml");
        std::fs::write(&path, "[export]\npage_size = 250\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.export.page_size, 250);

        std::fs::write(&path, "[export\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
