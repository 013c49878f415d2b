//! GPU data source with multi-vendor support (NVIDIA, AMD, Intel)

mod amd;
mod detector;
mod intel;
mod nvidia;

pub use amd::AmdManager;
pub use detector::{detect_gpus, GpuDetectConfig};
pub use intel::IntelManager;
pub use nvidia::NvidiaManager;

use crate::sysfs::{self, DrmCard};
use anyhow::Result;
use pulsedeck_core::{DataSource, FetchContext, SourceMetadata};
use pulsedeck_types::{GpuVendor, PanelSettings};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

/// DRM cards whose PCI vendor ID matches `vendor`, in card order
pub(crate) fn vendor_cards(drm_root: &Path, vendor: GpuVendor) -> Vec<DrmCard> {
    sysfs::list_drm_cards(drm_root)
        .into_iter()
        .filter(|card| card.vendor_id == Some(vendor.pci_id()))
        .collect()
}

/// Metric a GPU panel shows as its primary `value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuMetric {
    Utilization,
    Temperature,
    Frequency,
    Vram,
    Power,
    FanSpeed,
}

impl GpuMetric {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "utilization" => Some(Self::Utilization),
            "temperature" => Some(Self::Temperature),
            "frequency" => Some(Self::Frequency),
            "vram" => Some(Self::Vram),
            "power" => Some(Self::Power),
            "fan_speed" => Some(Self::FanSpeed),
            _ => None,
        }
    }
}

/// GPU data source
///
/// Settings: `gpu_index` (global aggregated index, default 0) and
/// `gpu_metric_to_display` (default `utilization`).
pub struct GpuSource {
    metadata: SourceMetadata,
    settings: PanelSettings,
    gpu_index: usize,
    metric: GpuMetric,
}

impl GpuSource {
    pub fn new(settings: &PanelSettings) -> Result<Self> {
        let index_setting = settings.get_config("gpu_index", "0");
        let gpu_index = index_setting.trim().parse::<usize>().unwrap_or_else(|_| {
            log::warn!("Invalid gpu_index '{}', using 0", index_setting);
            0
        });

        let metric_setting = settings.get_config("gpu_metric_to_display", "utilization");
        let metric = GpuMetric::parse(&metric_setting).unwrap_or_else(|| {
            log::warn!("Unknown GPU metric '{}', using utilization", metric_setting);
            GpuMetric::Utilization
        });

        Ok(Self {
            metadata: SourceMetadata {
                id: "gpu".to_string(),
                name: "GPU".to_string(),
                description: "GPU temperature, utilization, clock, VRAM, power and fan".to_string(),
                default_interval: Duration::from_secs(1),
            },
            settings: settings.clone(),
            gpu_index,
            metric,
        })
    }

    pub fn gpu_index(&self) -> usize {
        self.gpu_index
    }
}

impl DataSource for GpuSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn fetch(&self, ctx: &FetchContext) -> Result<Option<Value>> {
        let gpus = &ctx.gpus;
        let Some(metrics) = gpus.metrics(self.gpu_index) else {
            log::trace!("GPU {} not present", self.gpu_index);
            return Ok(None);
        };
        let vendor = gpus.resolve(self.gpu_index).map(|(vendor, _)| vendor.as_str());
        let name = gpus.gpu_names().remove(&self.gpu_index);

        let value = match self.metric {
            GpuMetric::Utilization => metrics.utilization.map(f64::from),
            GpuMetric::Temperature => metrics.temperature.map(f64::from),
            GpuMetric::Frequency => metrics.clock_mhz.map(f64::from),
            GpuMetric::Vram => metrics.vram.map(|v| v.percent),
            GpuMetric::Power => metrics.power_w.map(f64::from),
            GpuMetric::FanSpeed => metrics.fan_percent.map(f64::from),
        };

        Ok(Some(json!({
            "gpu_index": self.gpu_index,
            "name": name,
            "vendor": vendor,
            "temperature": metrics.temperature,
            "utilization": metrics.utilization,
            "frequency": metrics.clock_mhz,
            "vram": metrics.vram,
            "power": metrics.power_w,
            "fan_speed": metrics.fan_percent,
            "running_processes": metrics.running_processes,
            "value": value,
        })))
    }

    fn settings(&self) -> &PanelSettings {
        &self.settings
    }

    fn is_available(&self, ctx: &FetchContext) -> bool {
        self.gpu_index < ctx.gpus.device_count()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake `/sys/class/drm` trees

    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    pub struct FakeDrm {
        dir: TempDir,
    }

    impl FakeDrm {
        pub fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        pub fn root(&self) -> &Path {
            self.dir.path()
        }

        /// Create `cardN/device` with the given PCI vendor ID; returns the
        /// device directory
        pub fn card(&self, number: u32, vendor_id: u32) -> PathBuf {
            let device = self.root().join(format!("card{}", number)).join("device");
            fs::create_dir_all(&device).unwrap();
            fs::write(device.join("vendor"), format!("0x{:04x}\n", vendor_id)).unwrap();
            device
        }

        /// Create `<device>/hwmon/hwmonN`
        pub fn hwmon(&self, device: &Path, number: u32) -> PathBuf {
            let hwmon = device.join("hwmon").join(format!("hwmon{}", number));
            fs::create_dir_all(&hwmon).unwrap();
            hwmon
        }

        pub fn write(&self, dir: &Path, file: &str, content: &str) {
            fs::write(dir.join(file), content).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeDrm;
    use super::*;
    use pulsedeck_core::{CycleCache, GpuAggregator, VendorManager};
    use std::sync::Arc;

    fn context(drm: &FakeDrm) -> FetchContext {
        let managers: Vec<Box<dyn VendorManager>> = vec![
            Box::new(NvidiaManager::new(drm.root(), false)),
            Box::new(AmdManager::new(drm.root())),
        ];
        let gpus = GpuAggregator::new(managers);
        gpus.init();
        gpus.update();
        FetchContext::new(Arc::new(CycleCache::new()), Arc::new(gpus))
    }

    #[test]
    fn test_fetch_selected_metric() {
        let drm = FakeDrm::new();
        let device = drm.card(0, 0x1002);
        drm.write(&device, "gpu_busy_percent", "64");
        let hwmon = drm.hwmon(&device, 0);
        drm.write(&hwmon, "temp1_input", "70000");
        let ctx = context(&drm);

        let settings = PanelSettings::new()
            .with("gpu_index", json!("0"))
            .with("gpu_metric_to_display", json!("temperature"));
        let source = GpuSource::new(&settings).unwrap();
        assert!(source.is_available(&ctx));

        let value = source.fetch(&ctx).unwrap().unwrap();
        assert_eq!(value["value"], json!(70.0));
        assert_eq!(value["utilization"], json!(64.0));
        assert_eq!(value["vendor"], json!("AMD"));
        assert_eq!(value["name"], json!("AMD GPU 0"));
        assert_eq!(value["vram"], Value::Null);
    }

    #[test]
    fn test_out_of_range_index_is_absent() {
        let drm = FakeDrm::new();
        let ctx = context(&drm);
        let settings = PanelSettings::new().with("gpu_index", json!("3"));
        let source = GpuSource::new(&settings).unwrap();

        assert!(!source.is_available(&ctx));
        assert_eq!(source.fetch(&ctx).unwrap(), None);
    }

    #[test]
    fn test_bad_settings_fall_back() {
        let settings = PanelSettings::new()
            .with("gpu_index", json!("first"))
            .with("gpu_metric_to_display", json!("shader_units"));
        let source = GpuSource::new(&settings).unwrap();
        assert_eq!(source.gpu_index(), 0);
        assert_eq!(source.metric, GpuMetric::Utilization);
    }
}
