//! Application and panel configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::OverlapPolicy;
use pulsedeck_core::{DEFAULT_DRM_ROOT, WORKER_HEADROOM};
use pulsedeck_sources::GpuDetectConfig;
use pulsedeck_types::{PanelId, PanelSettings};

/// Application-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the config format
    #[serde(default = "default_version")]
    pub version: u32,
    /// Scheduler and worker pool settings
    #[serde(default)]
    pub engine: EngineSettings,
    /// GPU detection settings
    #[serde(default)]
    pub gpu: GpuSettings,
    /// Panels configuration
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
}

impl AppConfig {
    /// Load configuration from disk, or defaults if there is no file yet
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            log::info!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_path()?)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "pulsedeck", "pulsedeck")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("config.json"))
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a specific file path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            engine: EngineSettings::default(),
            gpu: GpuSettings::default(),
            panels: Vec::new(),
        }
    }
}

fn default_version() -> u32 {
    1
}

/// Scheduler and worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Scheduler tick period
    pub tick_interval_ms: u64,
    /// Worker threads on top of the core count
    pub worker_headroom: usize,
    /// Upper bound for `stop()` (scheduler join plus pool drain)
    pub shutdown_timeout_ms: u64,
    pub overlap_policy: OverlapPolicy,
}

impl EngineSettings {
    pub fn tick_interval(&self) -> Duration {
        // A zero tick would spin the scheduler
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            worker_headroom: WORKER_HEADROOM,
            shutdown_timeout_ms: 2000,
            overlap_policy: OverlapPolicy::default(),
        }
    }
}

/// GPU detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    pub drm_root: PathBuf,
    pub enable_nvml: bool,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            drm_root: PathBuf::from(DEFAULT_DRM_ROOT),
            enable_nvml: true,
        }
    }
}

impl From<&GpuSettings> for GpuDetectConfig {
    fn from(settings: &GpuSettings) -> Self {
        Self {
            drm_root: settings.drm_root.clone(),
            enable_nvml: settings.enable_nvml,
        }
    }
}

/// Panel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Unique ID for this panel; generated when missing
    #[serde(default = "PanelId::generate")]
    pub id: PanelId,
    /// Data source ID
    pub source: String,
    /// Custom settings, including `update_interval_seconds`
    #[serde(default)]
    pub settings: PanelSettings,
}
