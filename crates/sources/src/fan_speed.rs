//! Fan speed data source
//!
//! Fan readings are not part of the eager per-tick snapshot. The first fan
//! panel fetched in a tick scans hwmon through the cycle cache and every
//! other fan panel in that tick reuses the result.

use crate::hwmon;
use anyhow::Result;
use pulsedeck_core::{cache_keys, DataSource, FetchContext, SourceMetadata, DEFAULT_HWMON_ROOT};
use pulsedeck_types::{FanReading, PanelSettings};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

pub struct FanSpeedSource {
    metadata: SourceMetadata,
    settings: PanelSettings,
    fan_label: String,
    hwmon_root: PathBuf,
    cache_key: String,
}

impl FanSpeedSource {
    pub fn new(settings: &PanelSettings) -> Result<Self> {
        let root = settings.get_config("hwmon_root", DEFAULT_HWMON_ROOT);
        let cache_key = if root == DEFAULT_HWMON_ROOT {
            cache_keys::FANS.to_string()
        } else {
            format!("{}:{}", cache_keys::FANS, root)
        };

        Ok(Self {
            metadata: SourceMetadata {
                id: "fan_speed".to_string(),
                name: "Fan Speed".to_string(),
                description: "Fan RPM from hwmon sensors".to_string(),
                default_interval: Duration::from_secs(1),
            },
            settings: settings.clone(),
            fan_label: settings.get_config("fan_label", ""),
            hwmon_root: PathBuf::from(root),
            cache_key,
        })
    }
}

impl DataSource for FanSpeedSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn fetch(&self, ctx: &FetchContext) -> Result<Option<Value>> {
        let fans: Vec<FanReading> = ctx
            .cache
            .get_or_compute(&self.cache_key, || hwmon::read_fans(&self.hwmon_root));

        let selected = if self.fan_label.is_empty() {
            fans.first()
        } else {
            fans.iter().find(|fan| fan.label == self.fan_label)
        };

        Ok(Some(json!({
            "label": selected.map(|fan| fan.label.as_str()),
            "rpm": selected.map(|fan| fan.rpm),
            "fans": fans,
            "value": selected.map(|fan| fan.rpm),
        })))
    }

    fn settings(&self) -> &PanelSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsedeck_core::{CycleCache, GpuAggregator};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_fans_scanned_once_per_tick() {
        let root = TempDir::new().unwrap();
        let chip = root.path().join("hwmon0");
        fs::create_dir_all(&chip).unwrap();
        fs::write(chip.join("fan1_input"), "800").unwrap();
        fs::write(chip.join("fan1_label"), "CPU_FAN").unwrap();
        fs::write(chip.join("fan2_input"), "1300").unwrap();
        fs::write(chip.join("fan2_label"), "SYS_FAN").unwrap();

        let settings = PanelSettings::new()
            .with("hwmon_root", root.path().to_string_lossy().to_string())
            .with("fan_label", "SYS_FAN");
        let source = FanSpeedSource::new(&settings).unwrap();

        let cache = Arc::new(CycleCache::new());
        cache.rebuild(|_| {});
        let ctx = FetchContext::new(Arc::clone(&cache), Arc::new(GpuAggregator::empty()));

        let value = source.fetch(&ctx).unwrap().unwrap();
        assert_eq!(value["rpm"], json!(1300));

        // Same tick: the scan result is reused even though the file changed
        fs::write(chip.join("fan2_input"), "2000").unwrap();
        let value = source.fetch(&ctx).unwrap().unwrap();
        assert_eq!(value["rpm"], json!(1300));

        // Next tick rescans
        cache.rebuild(|_| {});
        let value = source.fetch(&ctx).unwrap().unwrap();
        assert_eq!(value["rpm"], json!(2000));
    }

    #[test]
    fn test_no_fans() {
        let root = TempDir::new().unwrap();
        let settings = PanelSettings::new().with("hwmon_root", root.path().to_string_lossy().to_string());
        let source = FanSpeedSource::new(&settings).unwrap();
        let ctx = FetchContext::new(Arc::new(CycleCache::new()), Arc::new(GpuAggregator::empty()));

        let value = source.fetch(&ctx).unwrap().unwrap();
        assert_eq!(value["value"], Value::Null);
        assert_eq!(value["fans"], json!([]));
    }
}
