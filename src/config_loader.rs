use crate::config::{config_file_in, Config, FileConfig, DATA_DIR_ENV, DEFAULT_DATA_DIR};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{debug, info};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pick the data directory: `--data-dir`, then `P3IPAM_DATADIR`, then the
/// built-in default. Blank values count as unset.
pub fn resolve_data_dir(cli: Option<&Path>, env: Option<&str>) -> PathBuf {
    if let Some(dir) = cli.filter(|d| !d.as_os_str().is_empty()) {
        return dir.to_path_buf();
    }
    if let Some(dir) = env.map(str::trim).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    PathBuf::from(DEFAULT_DATA_DIR)
}

/// Resolve the data directory and merge in `<data_dir>/p3ipam.yaml` if present
pub fn load_config(cli_data_dir: Option<&Path>) -> Result<Config> {
    let env_data_dir = std::env::var(DATA_DIR_ENV).ok();
    let data_dir = resolve_data_dir(cli_data_dir, env_data_dir.as_deref());
    debug!("Using data directory {}", data_dir.display());

    let mut config = Config::new(data_dir);
    let config_path = config_file_in(&config.data_dir);
    if config_path.exists() {
        config.ping = load_file_config(&config_path)?.ping;
    }

    config.validate()?;
    Ok(config)
}

/// Load and parse the settings file
pub fn load_file_config(config_path: &Path) -> Result<FileConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open {}", config_path.display()))?;
    let file_config: FileConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse {}", config_path.display()))?;

    file_config.ping.validate()?;
    Ok(file_config)
}

/// CLI arguments for `ping subnet` that can override YAML settings
#[derive(Debug, Clone, Default)]
pub struct PingCliOverrides {
    pub timeout: Option<Duration>,
    pub workers: Option<usize>,
}

/// Apply CLI overrides to the ping section
pub fn apply_ping_overrides(config: &mut Config, overrides: &PingCliOverrides) -> Result<()> {
    if let Some(timeout) = overrides.timeout {
        debug!("Ping timeout override: {:?}", timeout);
        config.ping.timeout = timeout;
    }
    if let Some(workers) = overrides.workers {
        debug!("Ping workers override: {}", workers);
        config.ping.workers = workers;
    }

    // Re-validate after applying overrides
    config.validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_data_dir_precedence() {
        assert_eq!(
            resolve_data_dir(Some(Path::new("/cli")), Some("/env")),
            PathBuf::from("/cli")
        );
        assert_eq!(resolve_data_dir(None, Some("/env")), PathBuf::from("/env"));
        assert_eq!(resolve_data_dir(None, Some("  ")), PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(resolve_data_dir(None, None), PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn test_load_config_reads_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("p3ipam.yaml")).unwrap();
        write!(file, "ping:\n  timeout: 2s\n  workers: 8\n  command: /usr/bin/ping\n").unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.ping.timeout, Duration::from_secs(2));
        assert_eq!(config.ping.workers, 8);
        assert_eq!(config.ping.command, "/usr/bin/ping");
    }

    #[test]
    fn test_load_config_without_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.ping, crate::config::PingConfig::default());
    }

    #[test]
    fn test_invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p3ipam.yaml"), "ping:\n  workers: 0\n").unwrap();
        assert!(load_config(Some(dir.path())).is_err());

        std::fs::write(dir.path().join("p3ipam.yaml"), "ping: [not, a, map]\n").unwrap();
        assert!(load_config(Some(dir.path())).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::new("/data");
        let overrides = PingCliOverrides {
            timeout: Some(Duration::from_millis(300)),
            workers: Some(2),
        };
        apply_ping_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.ping.timeout, Duration::from_millis(300));
        assert_eq!(config.ping.workers, 2);

        let zero = PingCliOverrides {
            workers: Some(0),
            ..Default::default()
        };
        assert!(apply_ping_overrides(&mut config, &zero).is_err());
    }
}
