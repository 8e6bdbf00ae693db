use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the data directory
pub const DATA_DIR_ENV: &str = "P3IPAM_DATADIR";

/// Data directory used when neither `--data-dir` nor the environment set one
pub const DEFAULT_DATA_DIR: &str = "/opt/p3ipam/.data";

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "p3ipam.db";

/// Optional settings file inside the data directory
pub const CONFIG_FILE: &str = "p3ipam.yaml";

/// Runtime configuration, resolved once at startup and passed down
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub ping: PingConfig,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ping: PingConfig::default(),
        }
    }

    /// `<data_dir>/p3ipam.db`
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// `<data_dir>/p3ipam.yaml`
    pub fn config_file_path(&self) -> PathBuf {
        config_file_in(&self.data_dir)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ValidationError::InvalidDataDir(
                "data directory must not be empty".to_string(),
            ));
        }
        self.ping.validate()
    }
}

pub fn config_file_in(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Settings for `ping subnet`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PingConfig {
    /// Per-address wait (e.g. "1s", "500ms")
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Concurrent probes
    pub workers: usize,
    /// Largest block a sweep will enumerate
    pub max_hosts: usize,
    /// Ping executable
    pub command: String,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            workers: 32,
            max_hosts: 4096,
            command: "ping".to_string(),
        }
    }
}

impl PingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout.is_zero() {
            return Err(ValidationError::InvalidPing(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ValidationError::InvalidPing(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.max_hosts == 0 {
            return Err(ValidationError::InvalidPing(
                "max_hosts must be at least 1".to_string(),
            ));
        }
        if self.command.trim().is_empty() {
            return Err(ValidationError::InvalidPing(
                "command must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Layout of the optional `p3ipam.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub ping: PingConfig,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid data directory: {0}")]
    InvalidDataDir(String),
    #[error("Invalid ping configuration: {0}")]
    InvalidPing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path() {
        let config = Config::new("/tmp/ipam");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/ipam/p3ipam.db"));
        assert_eq!(config.config_file_path(), PathBuf::from("/tmp/ipam/p3ipam.yaml"));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::new(DEFAULT_DATA_DIR).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ping_settings() {
        let mut config = Config::new("/data");
        config.ping.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::new("/data");
        config.ping.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::new("/data");
        config.ping.max_hosts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::new("/data");
        config.ping.command = "  ".to_string();
        assert!(config.validate().is_err());

        assert!(Config::new("").validate().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
ping:
  timeout: 250ms
  workers: 4
"#;
        let file: FileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.ping.timeout, Duration::from_millis(250));
        assert_eq!(file.ping.workers, 4);
        assert_eq!(file.ping.max_hosts, 4096);
        assert_eq!(file.ping.command, "ping");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let yaml = "ping:\n  retries: 3\n";
        assert!(serde_yaml::from_str::<FileConfig>(yaml).is_err());
    }
}
