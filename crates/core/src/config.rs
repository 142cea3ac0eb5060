//! Application configuration: built-in defaults, a TOML file and environment
//! overrides, layered with the `config` crate.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;

use crate::{
    economy::{EconomySettings, DEFAULT_AUTO_COLLECT_FRACTION, DEFAULT_MILESTONE},
    save::{remote::MAX_DOWNLOAD_BYTES, SaveSettings},
};

/// Directory name used under the platform config and data directories.
pub const APP_DIR: &str = "idle-tycoon";

/// Prefix for environment overrides, e.g. `IDLE_TYCOON__SAVE_DELAY_SECS=10`.
pub const ENV_PREFIX: &str = "IDLE_TYCOON";

const DEFAULT_CONFIG: &str = r#"# idle-tycoon configuration

# Where progress, the device id and logs are kept. Defaults to the platform data dir.
# data_dir = "/home/me/.local/share/idle-tycoon"

# Optional JSON catalog of resources; the built-in catalog is used when unset.
# catalog_path = "/home/me/catalog.json"

# Share of total output collected automatically every second (0.0 - 1.0).
auto_collect_fraction = 0.1

# Minimum seconds between remote uploads. Local saves happen on every change.
save_delay_secs = 5.0

# Gold thresholds that trigger a one-time milestone.
milestones = [1000000.0]

[remote]
enabled = false
root_url = ""
timeout_secs = 10
max_download_bytes = 1048576
"#;

/// Remote blob store settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Whether to sync with the remote store at all.
    pub enabled: bool,
    /// Object root; progress lives at `<root_url>/<device id>`.
    pub root_url: String,
    /// Request timeout, also bounding the startup download.
    pub timeout_secs: u64,
    /// Largest remote object accepted.
    pub max_download_bytes: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root_url: String::new(),
            timeout_secs: 10,
            max_download_bytes: MAX_DOWNLOAD_BYTES,
        }
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for progress, identity and log files.
    pub data_dir: PathBuf,
    /// Optional resource catalog file.
    pub catalog_path: Option<PathBuf>,
    /// Share of total output credited per second.
    pub auto_collect_fraction: f64,
    /// Debounce window for remote uploads, in seconds.
    pub save_delay_secs: f64,
    /// Gold milestones.
    pub milestones: Vec<f64>,
    /// Remote sync settings.
    pub remote: RemoteConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog_path: None,
            auto_collect_fraction: DEFAULT_AUTO_COLLECT_FRACTION,
            save_delay_secs: 5.0,
            milestones: vec![DEFAULT_MILESTONE],
            remote: RemoteConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default config file plus environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (optional) plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let config: Self = settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.auto_collect_fraction) {
            bail!(
                "auto_collect_fraction must be within [0, 1], got {}",
                self.auto_collect_fraction
            );
        }
        if Duration::try_from_secs_f64(self.save_delay_secs).is_err() {
            bail!(
                "save_delay_secs must be a non-negative number of seconds that fits a duration, got {}",
                self.save_delay_secs
            );
        }
        if self.remote.enabled && self.remote.root_url.trim().is_empty() {
            bail!("remote.root_url is required when remote sync is enabled");
        }
        Ok(())
    }

    /// Engine tunables derived from this configuration.
    pub fn economy_settings(&self) -> EconomySettings {
        EconomySettings {
            auto_collect_fraction: self.auto_collect_fraction,
            milestones: self.milestones.clone(),
        }
    }

    /// Save coordinator tunables derived from this configuration.
    pub fn save_settings(&self) -> SaveSettings {
        SaveSettings {
            save_delay: Duration::try_from_secs_f64(self.save_delay_secs)
                .unwrap_or(SaveSettings::default().save_delay),
            download_timeout: self.remote_timeout(),
            max_download_bytes: self.remote.max_download_bytes,
        }
    }

    /// Request timeout for the remote store.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs.max(1))
    }
}

/// Default location of the configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

/// Default location for progress and logs.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Write the commented default configuration if none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}
