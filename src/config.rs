use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::http::{FetchPolicy, ProxyConfig};
use crate::processing::DispatchDefaults;
use crate::{Result, ScraperError};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "TRANSCRIPT_SCRAPER_";

/// Configuration for the transcript scraper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of concurrent workers
    pub concurrency: usize,

    /// Transcript language used when a descriptor has none
    pub default_youtube_language: String,

    /// Per-request HTTP timeout
    pub timeout_seconds: u64,

    /// Maximum attempts per HTTP request
    pub max_retries: u32,

    /// Base of the retry backoff, in seconds
    pub backoff_factor: f64,

    /// Directory for caption side files
    pub artifacts_dir: PathBuf,

    /// DEBUG, INFO, WARNING, ERROR or CRITICAL
    pub log_level: String,

    /// Proxy used when a descriptor has none
    pub proxy: ProxyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 4,
            default_youtube_language: "en".to_string(),
            timeout_seconds: 20,
            max_retries: 3,
            backoff_factor: 1.5,
            artifacts_dir: PathBuf::from("artifacts"),
            log_level: "INFO".to_string(),
            proxy: ProxyConfig::default(),
        }
    }
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// The file did not exist
    Defaults(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl Config {
    /// Load configuration from a JSON or TOML file, chosen by extension.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is an error.
    /// Logging is usually not installed yet, so the caller reports the origin.
    pub fn load(path: &Path) -> Result<(Self, ConfigOrigin)> {
        if !path.exists() {
            return Ok((Self::default(), ConfigOrigin::Defaults(path.to_path_buf())));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents, ConfigFormat::for_path(path))
            .map_err(|e| ScraperError::Config(format!("Failed to parse config file {}: {}", path.display(), e)))?;

        Ok((config, ConfigOrigin::File(path.to_path_buf())))
    }

    fn parse(contents: &str, format: ConfigFormat) -> std::result::Result<Self, String> {
        match format {
            ConfigFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
        }
    }

    /// Apply `TRANSCRIPT_SCRAPER_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());

        if let Some(concurrency) = var("CONCURRENCY") {
            match concurrency.trim().parse() {
                Ok(n) => self.concurrency = n,
                Err(_) => warn!("Ignoring invalid {}CONCURRENCY: {}", ENV_PREFIX, concurrency),
            }
        }

        if let Some(log_level) = var("LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Some(dir) = var("ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(dir);
        }

        if let Some(http) = var("HTTP_PROXY") {
            self.proxy.http = Some(http);
        }

        if let Some(https) = var("HTTPS_PROXY") {
            self.proxy.https = Some(https);
        }
    }

    /// Save configuration to file, in the format its extension names
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match ConfigFormat::for_path(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ScraperError::Config(e.to_string()))?
            }
        };
        std::fs::write(path, contents)?;
        info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            return Err(ScraperError::Config("timeout_seconds must be greater than 0".to_string()));
        }

        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(ScraperError::Config(format!(
                "backoff_factor must be a non-negative number, got {}",
                self.backoff_factor
            )));
        }

        if self.default_youtube_language.trim().is_empty() {
            return Err(ScraperError::Config("default_youtube_language must not be empty".to_string()));
        }

        if level_name(&self.log_level).is_none() {
            return Err(ScraperError::Config(format!("Unknown log_level: {}", self.log_level)));
        }

        Ok(())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(self.timeout_seconds),
            max_retries: self.max_retries,
            backoff_factor: self.backoff_factor,
        }
    }

    pub fn dispatch_defaults(&self) -> DispatchDefaults {
        DispatchDefaults {
            language: self.default_youtube_language.clone(),
            proxy: self.proxy.clone(),
        }
    }

    /// tracing level name for `log_level`; unknown names read as `info`
    pub fn tracing_level(&self) -> &'static str {
        level_name(&self.log_level).unwrap_or("info")
    }

    /// `EnvFilter` directive for `log_level`, scoped to this crate
    pub fn tracing_directive(&self) -> String {
        format!("{}={}", env!("CARGO_CRATE_NAME"), self.tracing_level())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Transcript Scraper Configuration:\n\
            - Workers: {}\n\
            - Default YouTube Language: {}\n\
            - Timeout: {}s\n\
            - Max Retries: {}\n\
            - Backoff Factor: {}\n\
            - HTTP Proxy: {}\n\
            - HTTPS Proxy: {}\n\
            - Artifacts Directory: {}\n\
            - Log Level: {}",
            self.concurrency,
            self.default_youtube_language,
            self.timeout_seconds,
            self.max_retries,
            self.backoff_factor,
            self.proxy.http().unwrap_or("none"),
            self.proxy.https().unwrap_or("none"),
            self.artifacts_dir.display(),
            self.log_level
        )
    }
}

/// tracing level for a configured level name
fn level_name(level: &str) -> Option<&'static str> {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARN" | "WARNING" => Some("warn"),
        "ERROR" | "CRITICAL" => Some("error"),
        _ => None,
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Start from an already loaded configuration
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.config.default_youtube_language = language.into();
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.config.backoff_factor = factor;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = proxy;
        self
    }

    pub fn with_artifacts_dir(mut self, dir: PathBuf) -> Self {
        self.config.artifacts_dir = dir;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.default_youtube_language, "en");
        assert_eq!(config.timeout_seconds, 20);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.artifacts_dir, PathBuf::from("artifacts"));
        assert!(config.proxy.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_concurrency(8)
            .with_default_language("de")
            .with_max_retries(0)
            .build();

        assert_eq!(config.concurrency, 8);
        assert_eq!(config.default_youtube_language, "de");
        assert_eq!(config.fetch_policy().attempts(), 1);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.json");

        let (config, origin) = Config::load(&path).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(origin, ConfigOrigin::Defaults(path));
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"concurrency": 2, "proxy": {"https": "http://proxy:3128"}}"#).unwrap();

        let (config, origin) = Config::load(&path).unwrap();

        assert_eq!(config.concurrency, 2);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.proxy.https(), Some("http://proxy:3128"));
        assert_eq!(origin, ConfigOrigin::File(path));
    }

    #[test]
    fn test_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        std::fs::write(&path, "timeout_seconds = 5\nlog_level = \"DEBUG\"\n\n[proxy]\nhttp = \"http://p:1\"\n").unwrap();

        let (config, _) = Config::load(&path).unwrap();

        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.proxy.http(), Some("http://p:1"));
        assert_eq!(config.tracing_directive(), "video_transcript_scraper=debug");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new().with_backoff_factor(2.0).build();

        for name in ["saved.json", "saved.toml"] {
            let path = temp_dir.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(Config::load(&path).unwrap().0, config);
        }
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TRANSCRIPT_SCRAPER_CONCURRENCY", "9"),
            ("TRANSCRIPT_SCRAPER_LOG_LEVEL", "WARNING"),
            ("TRANSCRIPT_SCRAPER_HTTPS_PROXY", "http://env:8080"),
            ("TRANSCRIPT_SCRAPER_ARTIFACTS_DIR", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.concurrency, 9);
        assert_eq!(config.tracing_directive(), "video_transcript_scraper=warn");
        assert_eq!(config.proxy.https(), Some("http://env:8080"));
        assert_eq!(config.artifacts_dir, PathBuf::from("artifacts"));
    }

    #[test]
    fn test_invalid_concurrency_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| (key == "TRANSCRIPT_SCRAPER_CONCURRENCY").then(|| "many".to_string()));
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_config_validation() {
        assert!(ConfigBuilder::new().with_timeout_seconds(0).build().validate().is_err());
        assert!(ConfigBuilder::new().with_backoff_factor(-1.0).build().validate().is_err());
        assert!(ConfigBuilder::new().with_log_level("LOUD").build().validate().is_err());
        assert!(ConfigBuilder::new().with_log_level("critical").build().validate().is_ok());
    }
}
