//! Configuration management for lnwcrawl.
//!
//! Handles loading and validating configuration from the
//! platform-specific config directory. Command-line flags are applied
//! on top of whatever the file provides.

use crate::cookies::Browser;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "lnwcrawl";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// User agent sent when none is configured. It has to match the browser
/// the cookies were exported from.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:135.0) Gecko/20100101 Firefox/135.0";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP session settings.
    pub session: SessionConfig,

    /// Traversal settings.
    pub crawl: CrawlConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Request pacing, retry and identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fixed delay before each request in seconds.
    pub wait_sec: f64,

    /// Upper bound of the random extra delay in milliseconds.
    pub wait_random_ms: u64,

    /// Number of retries after the first failed attempt.
    pub retries: u32,

    /// Delay between retries in seconds.
    pub retry_wait_sec: f64,

    /// Transport timeout in seconds.
    pub timeout_sec: f64,

    /// User agent header.
    pub user_agent: String,

    /// Browser whose exported cookies are loaded.
    pub browser: Browser,

    /// Refuse to fetch the same URL twice in one run.
    pub dedupe: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wait_sec: 2.0,
            wait_random_ms: 3000,
            retries: 3,
            retry_wait_sec: 30.0,
            timeout_sec: 30.0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            browser: Browser::Firefox,
            dedupe: false,
        }
    }
}

impl SessionConfig {
    /// Fixed pre-request delay.
    pub fn wait(&self) -> Duration {
        Duration::from_secs_f64(self.wait_sec)
    }

    /// Maximum random pre-request delay.
    pub fn wait_random(&self) -> Duration {
        Duration::from_millis(self.wait_random_ms)
    }

    /// Delay between retries.
    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs_f64(self.retry_wait_sec)
    }

    /// Transport timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_sec)
    }
}

/// What to do when one item discovered on a listing or chapter-list page fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole page at the first failing item.
    #[default]
    Abort,
    /// Record the failure and continue with the next item.
    Skip,
}

/// Traversal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Root directory novels and chapters are written into.
    pub output_directory: PathBuf,

    /// Handling of failures on individual discovered items.
    pub on_child_failure: FailurePolicy,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            on_child_failure: FailurePolicy::Abort,
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory searched for exported browser cookie files.
    pub cookies_directory: Option<PathBuf>,
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_seconds("session.wait_sec", self.session.wait_sec, false)?;
        check_seconds("session.retry_wait_sec", self.session.retry_wait_sec, false)?;
        check_seconds("session.timeout_sec", self.session.timeout_sec, true)?;

        if self.session.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "session.user_agent".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if !self.crawl.output_directory.is_dir() {
            return Err(ConfigError::InvalidDirectory(
                self.crawl.output_directory.clone(),
            ));
        }

        Ok(())
    }

    /// Returns the effective cookie directory, using config or default.
    pub fn cookies_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.paths.cookies_directory {
            Ok(dir.clone())
        } else {
            Ok(Self::config_dir()?.join("cookies"))
        }
    }
}

fn check_seconds(key: &str, value: f64, strictly_positive: bool) -> Result<(), ConfigError> {
    let message = if !value.is_finite() {
        "must be a finite number"
    } else if strictly_positive && value <= 0.0 {
        "must be greater than 0"
    } else if value < 0.0 {
        "must not be negative"
    } else if Duration::try_from_secs_f64(value).is_err() {
        "is too large"
    } else {
        return Ok(());
    };

    Err(ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.wait_sec, 2.0);
        assert_eq!(config.session.wait_random_ms, 3000);
        assert_eq!(config.session.retries, 3);
        assert_eq!(config.session.retry_wait_sec, 30.0);
        assert_eq!(config.session.timeout_sec, 30.0);
        assert_eq!(config.session.browser, Browser::Firefox);
        assert!(!config.session.dedupe);
        assert_eq!(config.crawl.on_child_failure, FailurePolicy::Abort);
    }

    #[test]
    fn test_durations() {
        let session = SessionConfig {
            wait_sec: 1.5,
            wait_random_ms: 250,
            ..SessionConfig::default()
        };
        assert_eq!(session.wait(), Duration::from_millis(1500));
        assert_eq!(session.wait_random(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.session.browser = Browser::OperaGx;
        config.crawl.on_child_failure = FailurePolicy::Skip;
        let file = NamedTempFile::new().unwrap();

        std::fs::write(file.path(), toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.session.browser, Browser::OperaGx);
        assert_eq!(loaded.crawl.on_child_failure, FailurePolicy::Skip);
        assert_eq!(loaded.session.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[session]\nretries = 7\nbrowser = \"brave\"\n").unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.session.retries, 7);
        assert_eq!(loaded.session.browser, Browser::Brave);
        assert_eq!(loaded.session.wait_random_ms, 3000);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.session.retries, 3);
    }

    #[test]
    fn test_unknown_browser_in_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[session]\nbrowser = \"netscape\"\n").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_config_validation() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.crawl.output_directory = dir.path().to_path_buf();
        assert!(config.validate().is_ok());

        config.session.timeout_sec = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.session.timeout_sec = 30.0;
        config.session.wait_sec = -1.0;
        assert!(config.validate().is_err());

        config.session.wait_sec = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_seconds_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.crawl.output_directory = dir.path().to_path_buf();

        config.session.wait_sec = 1e20;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "session.wait_sec")
        );

        config.session.wait_sec = 2.0;
        config.session.retry_wait_sec = 1e20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "session.retry_wait_sec"
        ));

        config.session.retry_wait_sec = 30.0;
        config.session.timeout_sec = f64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "session.timeout_sec"
        ));

        config.session.timeout_sec = 30.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.session.wait(), Duration::from_secs(2));
    }

    #[test]
    fn test_missing_output_directory() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.crawl.output_directory = dir.path().join("nope");

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDirectory(_))
        ));
    }
}
