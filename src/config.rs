//! Configuration for hwpoll
//!
//! Poll cadence, rebuild interval, device preferences and selector tuning.
//! Every field has a serde default, so partial files load.

use crate::error::{Error, Result};
use crate::reload::PreferenceState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
}

/// Poll loop and persistence options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Safety-net catalog rebuild interval (seconds)
    #[serde(default = "default_rebuild_interval")]
    pub rebuild_interval_secs: u64,
    /// Longest a consumer waits for the resolver lock before serving cached values
    #[serde(default = "default_lock_wait")]
    pub lock_wait_ms: u64,
    /// Where adaptive maxima are persisted; not persisted when unset
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default = "default_persist_every")]
    pub persist_every_ticks: u64,
}

/// Manual device overrides and optional subsystems
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub preferred_disk: Option<String>,
    #[serde(default)]
    pub preferred_network: Option<String>,
    #[serde(default)]
    pub preferred_fan: Option<String>,
    #[serde(default)]
    pub fan_scanning: bool,
    #[serde(default)]
    pub controller_scanning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Minimum time between full candidate rescans (seconds)
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Bytes/s above which the cached device is kept without rescanning
    #[serde(default = "default_activity_threshold")]
    pub activity_threshold: f32,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_rebuild_interval() -> u64 {
    600 // 10 minutes
}

fn default_lock_wait() -> u64 {
    5
}

fn default_persist_every() -> u64 {
    60
}

fn default_cooldown() -> u64 {
    10
}

fn default_activity_threshold() -> f32 {
    1024.0
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            rebuild_interval_secs: default_rebuild_interval(),
            lock_wait_ms: default_lock_wait(),
            state_file: None,
            persist_every_ticks: default_persist_every(),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            activity_threshold: default_activity_threshold(),
        }
    }
}

impl GeneralConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.rebuild_interval_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

impl Config {
    /// Get the default configuration file path
    ///
    /// Returns `~/.config/hwpoll/config.toml` on Unix-like systems,
    /// or `%APPDATA%\hwpoll\config.toml` on Windows.
    pub fn default_path() -> PathBuf {
        let config_dir = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        };

        config_dir.join("hwpoll").join("config.toml")
    }

    /// Load configuration from the default path, or defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Preferences the rebuild coordinator compares against
    pub fn preferences(&self) -> PreferenceState {
        PreferenceState {
            preferred_disk: self.devices.preferred_disk.clone(),
            preferred_network: self.devices.preferred_network.clone(),
            preferred_fan: self.devices.preferred_fan.clone(),
            fan_scanning: self.devices.fan_scanning,
            controller_scanning: self.devices.controller_scanning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.poll_interval_ms, 1000);
        assert_eq!(config.general.rebuild_interval(), Duration::from_secs(600));
        assert_eq!(config.general.lock_wait(), Duration::from_millis(5));
        assert_eq!(config.selector.cooldown_secs, 10);
        assert!(!config.devices.fan_scanning);
        assert_eq!(config.preferences(), PreferenceState::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [devices]
            preferred_disk = "Samsung SSD 990 PRO"
            fan_scanning = true
            "#,
        )
        .unwrap();
        assert_eq!(config.general.poll_interval_ms, 1000);
        let prefs = config.preferences();
        assert_eq!(prefs.preferred_disk.as_deref(), Some("Samsung SSD 990 PRO"));
        assert!(prefs.fan_scanning);
        assert!(!prefs.controller_scanning);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.general.state_file = Some(dir.path().join("maxima.json"));
        config.selector.activity_threshold = 4096.0;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\npoll_interval_ms = \"fast\"").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
