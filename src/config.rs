//! Application paths and sync engine settings.
//!
//! Settings live in `swingsync.json` in the config directory. Every field has
//! a default, so a missing file or a partial file both work.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "swingsync.json";
pub const LOG_FILE: &str = "swingsync.log";

/// Overrides for default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (SWINGSYNC_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| {
            std::env::var("SWINGSYNC_CONFIG_DIR")
                .ok()
                .map(PathBuf::from)
        });
        Self { config_dir }
    }
}

/// Path to a configuration file.
///
/// Priority:
/// 1. CLI --config-dir / SWINGSYNC_CONFIG_DIR
/// 2. Current folder if it already holds swingsync.json or swingsync.log
/// 3. Platform config dir (`~/.config/swingsync` on Linux)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir).join(name)
}

/// Path to a data file (logs). Same priority, platform data dir last.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir).join(name)
}

/// Create config and data directories if missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = resolve_dir(config, dirs_next::config_dir);
    let data_dir = resolve_dir(config, dirs_next::data_dir);

    for dir in [&config_dir, &data_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
    }
    Ok(())
}

fn has_local_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, platform: fn() -> Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current) = std::env::current_dir()
        && has_local_files(&current)
    {
        return current;
    }

    if let Some(dir) = platform() {
        return dir.join("swingsync");
    }

    PathBuf::from(".")
}

/// Tunables for the sync controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Polling loop period (16ms ~ one 60Hz display frame)
    pub tick_interval_ms: u64,
    /// Rate applied before the user picks one
    pub default_rate: f64,
    /// Re-seek the right clip when relative drift exceeds this (None = off)
    pub drift_threshold_ms: Option<f64>,
    /// Report a slot as failed if loading takes longer (None = wait forever)
    pub load_timeout_ms: Option<u64>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            default_rate: 1.0,
            drift_threshold_ms: None,
            load_timeout_ms: None,
        }
    }
}

impl SyncSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}

/// Load settings; absent or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> SyncSettings {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            debug!("No settings at {} ({}), using defaults", path.display(), e);
            return SyncSettings::default();
        }
    };
    match serde_json::from_str(&json) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Ignoring malformed settings {}: {}", path.display(), e);
            SyncSettings::default()
        }
    }
}

/// Load settings, writing the defaults out first if no file exists yet.
pub fn load_or_init_settings(path: &Path) -> SyncSettings {
    if path.exists() {
        return load_settings(path);
    }
    let defaults = SyncSettings::default();
    match save_settings(&defaults, path) {
        Ok(()) => info!("Wrote default settings to {}", path.display()),
        Err(e) => warn!("Could not write default settings: {:#}", e),
    }
    defaults
}

pub fn save_settings(settings: &SyncSettings, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(settings).context("Serialize settings")?;
    fs::write(path, json).with_context(|| format!("Write settings {}", path.display()))?;
    Ok(())
}
