//! CLI configuration management
//!
//! The device settings come from the shared `config.toml`; command-line flags
//! and `TBAN_*` environment variables override selected fields on top.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use tban_core::{default_config_path, TbanConfig};

pub const ENV_DEVICE: &str = "TBAN_DEVICE";
pub const ENV_LOCK_FILE: &str = "TBAN_LOCKFILE";
pub const ENV_LOCK_TIMEOUT: &str = "TBAN_LOCK_TIMEOUT";
pub const ENV_RETRIES: &str = "TBAN_RETRIES";

const MAX_LOCK_TIMEOUT_SECS: u64 = 3600;
const MAX_RETRIES: u32 = 100;

/// Effective CLI configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    /// Library configuration after every override
    pub tban: TbanConfig,

    /// File the configuration was read from, if any
    pub source: Option<PathBuf>,

    /// Output format, `table` or `json`
    pub output_format: String,

    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            tban: TbanConfig::default(),
            source: None,
            output_format: "table".to_string(),
            verbose: false,
        }
    }
}

impl CliConfig {
    /// Create a new builder for constructing configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Write the library part back to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = self.tban.to_toml().context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}

/// Builder for the CLI configuration
///
/// Layers are applied in call order, each one overwriting what it sets:
/// 1. Defaults
/// 2. Config file
/// 3. Environment variables
/// 4. CLI arguments
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    tban: Option<TbanConfig>,
    source: Option<PathBuf>,
    device: Option<String>,
    lock_file: Option<PathBuf>,
    lock_timeout: Option<u64>,
    retries: Option<u32>,
    output_format: Option<String>,
    verbose: Option<bool>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the config file at `path`, or the default location when `None`
    ///
    /// A missing file leaves the defaults in place; a malformed one is an
    /// error.
    pub fn with_config_file(mut self, path: Option<&Path>, load_file: bool) -> Result<Self> {
        if !load_file {
            return Ok(self);
        }

        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let config = TbanConfig::load(&path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?;
        if path.exists() {
            self.source = Some(path);
        }
        self.tban = Some(config);
        Ok(self)
    }

    /// Apply the `TBAN_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`
    ///
    /// Values that do not parse or fail validation are ignored.
    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device) = lookup(ENV_DEVICE).filter(|d| !d.is_empty()) {
            self.device = Some(device);
        }

        if let Some(lock_file) = lookup(ENV_LOCK_FILE).filter(|p| !p.is_empty()) {
            self.lock_file = Some(PathBuf::from(lock_file));
        }

        if let Some(timeout) = lookup(ENV_LOCK_TIMEOUT).and_then(|t| t.parse().ok()) {
            if Self::validate_lock_timeout(timeout).is_ok() {
                self.lock_timeout = Some(timeout);
            }
        }

        if let Some(retries) = lookup(ENV_RETRIES).and_then(|r| r.parse().ok()) {
            if Self::validate_retries(retries).is_ok() {
                self.retries = Some(retries);
            }
        }

        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Result<Self> {
        let device = device.into();
        if device.is_empty() {
            return Err(anyhow::anyhow!("Device path cannot be empty"));
        }
        self.device = Some(device);
        Ok(self)
    }

    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Seconds to wait for another process holding the lock
    pub fn with_lock_timeout(mut self, secs: u64) -> Result<Self> {
        Self::validate_lock_timeout(secs)?;
        self.lock_timeout = Some(secs);
        Ok(self)
    }

    /// Total attempts for each device operation
    pub fn with_retries(mut self, retries: u32) -> Result<Self> {
        Self::validate_retries(retries)?;
        self.retries = Some(retries);
        Ok(self)
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Result<Self> {
        let format = format.into();
        Self::validate_output_format(&format)?;
        self.output_format = Some(format);
        Ok(self)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Build the final configuration with validation
    pub fn build(self) -> Result<CliConfig> {
        let defaults = CliConfig::default();
        let mut tban = self.tban.unwrap_or_default();

        if let Some(device) = self.device {
            tban.device.path = device;
        }
        if let Some(lock_file) = self.lock_file {
            tban.lock.path = lock_file;
        }
        if let Some(timeout) = self.lock_timeout {
            tban.lock.timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            tban.retry.attempts = retries;
        }

        let output_format = self.output_format.unwrap_or(defaults.output_format);

        tban.device.validate().context("Invalid device settings")?;
        Self::validate_lock_timeout(tban.lock.timeout_secs)?;
        Self::validate_retries(tban.retry.attempts)?;
        Self::validate_output_format(&output_format)?;

        Ok(CliConfig {
            tban,
            source: self.source,
            output_format,
            verbose: self.verbose.unwrap_or(defaults.verbose),
        })
    }

    fn validate_lock_timeout(secs: u64) -> Result<()> {
        if secs > MAX_LOCK_TIMEOUT_SECS {
            return Err(anyhow::anyhow!(
                "Lock timeout must be at most {} seconds",
                MAX_LOCK_TIMEOUT_SECS
            ));
        }
        Ok(())
    }

    fn validate_retries(retries: u32) -> Result<()> {
        if retries == 0 || retries > MAX_RETRIES {
            return Err(anyhow::anyhow!(
                "Retries must be between 1 and {}",
                MAX_RETRIES
            ));
        }
        Ok(())
    }

    fn validate_output_format(format: &str) -> Result<()> {
        match format {
            "table" | "json" => Ok(()),
            _ => Err(anyhow::anyhow!(
                "Invalid output format '{}'. Must be 'table' or 'json'",
                format
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builder_with_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.tban.device.path, "/dev/ttyUSB0");
        assert_eq!(config.tban.retry.attempts, 3);
    }

    #[test]
    fn test_builder_with_custom_values() {
        let config = ConfigBuilder::new()
            .with_device("/dev/ttyUSB3")
            .unwrap()
            .with_lock_file("/run/tban.lock")
            .with_lock_timeout(2)
            .unwrap()
            .with_retries(5)
            .unwrap()
            .with_output_format("json")
            .unwrap()
            .with_verbose(true)
            .build()
            .unwrap();

        assert_eq!(config.tban.device.path, "/dev/ttyUSB3");
        assert_eq!(config.tban.lock.path, PathBuf::from("/run/tban.lock"));
        assert_eq!(config.tban.lock.timeout_secs, 2);
        assert_eq!(config.tban.retry.attempts, 5);
        assert_eq!(config.output_format, "json");
        assert!(config.verbose);
    }

    #[test]
    fn test_builder_validation() {
        assert!(ConfigBuilder::new().with_device("").is_err());
        assert!(ConfigBuilder::new().with_retries(0).is_err());
        assert!(ConfigBuilder::new().with_retries(101).is_err());
        assert!(ConfigBuilder::new().with_lock_timeout(3601).is_err());
        assert!(ConfigBuilder::new().with_output_format("xml").is_err());
        assert!(ConfigBuilder::new().with_output_format("table").is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigBuilder::new()
            .with_env_from(env(&[
                (ENV_DEVICE, "/dev/ttyACM0"),
                (ENV_LOCK_FILE, "/var/lock/xban"),
                (ENV_LOCK_TIMEOUT, "4"),
                (ENV_RETRIES, "7"),
            ]))
            .build()
            .unwrap();

        assert_eq!(config.tban.device.path, "/dev/ttyACM0");
        assert_eq!(config.tban.lock.path, PathBuf::from("/var/lock/xban"));
        assert_eq!(config.tban.lock.timeout_secs, 4);
        assert_eq!(config.tban.retry.attempts, 7);
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let config = ConfigBuilder::new()
            .with_env_from(env(&[
                (ENV_DEVICE, ""),
                (ENV_LOCK_TIMEOUT, "soon"),
                (ENV_RETRIES, "0"),
            ]))
            .build()
            .unwrap();

        assert_eq!(config.tban.device.path, "/dev/ttyUSB0");
        assert_eq!(config.tban.lock.timeout_secs, 10);
        assert_eq!(config.tban.retry.attempts, 3);
    }

    #[test]
    fn test_priority_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[device]\npath = \"/dev/from-file\"\n[retry]\nattempts = 2\n[lock]\ntimeout_secs = 1\n",
        )
        .unwrap();

        let config = ConfigBuilder::new()
            .with_config_file(Some(&path), true)
            .unwrap()
            .with_env_from(env(&[(ENV_DEVICE, "/dev/from-env"), (ENV_RETRIES, "4")]))
            .with_device("/dev/from-flag")
            .unwrap()
            .build()
            .unwrap();

        // flag beats env, env beats file, file beats defaults
        assert_eq!(config.tban.device.path, "/dev/from-flag");
        assert_eq!(config.tban.retry.attempts, 4);
        assert_eq!(config.tban.lock.timeout_secs, 1);
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigBuilder::new()
            .with_config_file(Some(&dir.path().join("absent.toml")), true)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.tban, TbanConfig::default());
        assert!(config.source.is_none());
    }

    #[test]
    fn test_malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[device\npath = 3").unwrap();
        assert!(ConfigBuilder::new()
            .with_config_file(Some(&path), true)
            .is_err());
    }

    #[test]
    fn test_no_config_skips_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[device\n").unwrap();
        let config = ConfigBuilder::new()
            .with_config_file(Some(&path), false)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.tban, TbanConfig::default());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = CliConfig::default();
        config.tban.device.path = "/dev/ttyUSB9".to_string();
        config.save(&path).unwrap();

        let loaded = TbanConfig::load(&path).unwrap();
        assert_eq!(loaded.device.path, "/dev/ttyUSB9");
    }
}
