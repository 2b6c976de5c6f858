//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional, partial files allowed)
//! - Runtime defaults
//! - Validation

use crate::period::Period;
use crate::profitability::DEFAULT_UNIT_COST;
use crate::source::PublishedCsvSource;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub refresh: RefreshConfig,
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

/// Where raw rows come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Spreadsheet id for the authenticated values API.
    pub spreadsheet_id: Option<String>,
    /// Id of the "publish to web" document; defaults to `spreadsheet_id`.
    pub published_id: Option<String>,
    pub api_base_url: String,
    pub public_base_url: String,
    pub access_token: Option<String>,
    pub fetch_timeout_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub default_period: String,
    pub request_timeout_secs: u64,
    /// Keep refreshing in the background after `refresh`, as `watch` does.
    pub auto_refresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Estimated cost of handling one ticket.
    pub unit_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ERROR".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            published_id: None,
            api_base_url: "https://sheets.googleapis.com".to_string(),
            public_base_url: "https://docs.google.com/spreadsheets/d/e".to_string(),
            access_token: None,
            fetch_timeout_secs: PublishedCsvSource::DEFAULT_TIMEOUT.as_secs(),
            max_redirects: PublishedCsvSource::DEFAULT_MAX_REDIRECTS,
            user_agent: PublishedCsvSource::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            default_period: Period::default().code().to_string(),
            request_timeout_secs: 60,
            auto_refresh: false,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            unit_cost: DEFAULT_UNIT_COST,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ticket-insights")
                .join("tickets.db"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl RefreshConfig {
    /// Configured background period; unknown codes resolve to the default.
    pub fn period(&self) -> Period {
        Period::from_code_or_default(&self.default_period)
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            PathBuf::from("ticket-insights.toml"),
            PathBuf::from(".ticket-insights.toml"),
            dirs::config_dir()
                .map(|d| d.join("ticket-insights").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("TICKET_INSIGHTS_SPREADSHEET_ID") {
            self.source.spreadsheet_id = Some(val);
        }
        if let Ok(val) = env::var("TICKET_INSIGHTS_PUBLISHED_ID") {
            self.source.published_id = Some(val);
        }
        if let Ok(val) = env::var("TICKET_INSIGHTS_ACCESS_TOKEN") {
            self.source.access_token = Some(val);
        }

        if let Ok(val) = env::var("TICKET_INSIGHTS_REFRESH_SECS") {
            self.refresh.interval_secs = val
                .parse()
                .context("Invalid TICKET_INSIGHTS_REFRESH_SECS")?;
        }
        if let Ok(val) = env::var("TICKET_INSIGHTS_DEFAULT_PERIOD") {
            self.refresh.default_period = val;
        }
        if let Ok(val) = env::var("TICKET_INSIGHTS_UNIT_COST") {
            self.analysis.unit_cost = val.parse().context("Invalid TICKET_INSIGHTS_UNIT_COST")?;
        }

        if let Ok(val) = env::var("TICKET_INSIGHTS_DB") {
            self.storage.database_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("TICKET_INSIGHTS_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.refresh.interval_secs == 0 {
            return Err(anyhow::anyhow!("Refresh interval must be greater than 0"));
        }
        if self.refresh.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }
        if self.source.fetch_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Fetch timeout must be greater than 0"));
        }

        if !self.analysis.unit_cost.is_finite() || self.analysis.unit_cost < 0.0 {
            return Err(anyhow::anyhow!(
                "Unit cost must be a non-negative number, got {}",
                self.analysis.unit_cost
            ));
        }

        if self.refresh.default_period.parse::<Period>().is_err() {
            warn!(
                default_period = %self.refresh.default_period,
                fallback = %Period::default(),
                "Unknown default period, using fallback"
            );
        }

        if self.source.spreadsheet_id.is_some() && self.source.access_token.is_none() {
            warn!("Spreadsheet id set without access token; only the published CSV will work");
        }

        if self.logging.output != "console" && !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Install `config` as the global configuration. First caller wins.
pub fn init_config(config: Config) -> &'static Config {
    CONFIG.get_or_init(|| config)
}

/// Get the global configuration instance
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::load().unwrap_or_else(|err| {
            warn!(error = %err, "Failed to load configuration, using defaults");
            Config::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "ERROR");
        assert_eq!(config.refresh.interval_secs, 30);
        assert_eq!(config.refresh.period(), Period::Last30Days);
        assert_eq!(config.analysis.unit_cost, 10.0);
        assert_eq!(config.source.max_redirects, 5);
        assert_eq!(config.source.fetch_timeout_secs, 15);
    }

    #[test]
    fn test_env_override() {
        env::set_var("TICKET_INSIGHTS_UNIT_COST", "12.5");
        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.analysis.unit_cost, 12.5);
        env::remove_var("TICKET_INSIGHTS_UNIT_COST");
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.refresh.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.unit_cost = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[refresh]\ndefault_period = \"7d\"\n").unwrap();
        assert_eq!(config.refresh.period(), Period::Last7Days);
        assert_eq!(config.refresh.interval_secs, 30);
        assert_eq!(config.logging.format, "pretty");
    }
}
