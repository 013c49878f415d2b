//! GPU detection: builds the aggregator from every vendor manager

use super::{AmdManager, IntelManager, NvidiaManager};
use pulsedeck_core::{GpuAggregator, VendorManager, DEFAULT_DRM_ROOT};
use std::path::PathBuf;

/// Where and how to look for GPUs
#[derive(Debug, Clone)]
pub struct GpuDetectConfig {
    pub drm_root: PathBuf,
    /// Try NVML before falling back to sysfs for NVIDIA cards
    pub enable_nvml: bool,
}

impl Default for GpuDetectConfig {
    fn default() -> Self {
        Self {
            drm_root: PathBuf::from(DEFAULT_DRM_ROOT),
            enable_nvml: true,
        }
    }
}

/// Create and initialize the vendor managers in precedence order
/// (NVIDIA, AMD, Intel) and return the aggregator over them
pub fn detect_gpus(config: &GpuDetectConfig) -> GpuAggregator {
    log::warn!("=== Detecting GPUs ===");

    let managers: Vec<Box<dyn VendorManager>> = vec![
        Box::new(NvidiaManager::new(&config.drm_root, config.enable_nvml)),
        Box::new(AmdManager::new(&config.drm_root)),
        Box::new(IntelManager::new(&config.drm_root)),
    ];

    let gpus = GpuAggregator::new(managers);
    gpus.init();

    for (index, name) in gpus.gpu_names() {
        log::warn!("  GPU {}: {}", index, name);
    }
    if gpus.device_count() == 0 {
        log::info!("No GPUs detected");
    }
    gpus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing::FakeDrm;
    use pulsedeck_types::GpuVendor;

    #[test]
    fn test_precedence_nvidia_then_amd() {
        let drm = FakeDrm::new();
        // Card order deliberately differs from vendor precedence
        drm.card(0, 0x1002);
        drm.card(1, 0x10de);
        drm.card(2, 0x1002);

        let gpus = detect_gpus(&GpuDetectConfig {
            drm_root: drm.root().to_path_buf(),
            enable_nvml: false,
        });

        assert_eq!(gpus.device_count(), 3);
        assert_eq!(gpus.resolve(0), Some((GpuVendor::Nvidia, 0)));
        assert_eq!(gpus.resolve(1), Some((GpuVendor::Amd, 0)));
        assert_eq!(gpus.resolve(2), Some((GpuVendor::Amd, 1)));

        let names: Vec<String> = gpus.gpu_names().into_values().collect();
        assert_eq!(names, vec!["NVIDIA GPU 0", "AMD GPU 0", "AMD GPU 1"]);
    }

    #[test]
    fn test_repeated_update_is_stable() {
        let drm = FakeDrm::new();
        let device = drm.card(0, 0x1002);
        drm.write(&device, "gpu_busy_percent", "12");
        drm.write(&device, "mem_info_vram_used", "1073741824");
        drm.write(&device, "mem_info_vram_total", "8589934592");

        let gpus = detect_gpus(&GpuDetectConfig {
            drm_root: drm.root().to_path_buf(),
            enable_nvml: false,
        });
        gpus.update();
        let first = gpus.metrics(0).unwrap();
        gpus.update();
        let second = gpus.metrics(0).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.utilization, Some(12.0));
    }

    #[test]
    fn test_no_drm_directory() {
        let drm = FakeDrm::new();
        let gpus = detect_gpus(&GpuDetectConfig {
            drm_root: drm.root().join("nope"),
            enable_nvml: false,
        });
        gpus.update();
        assert_eq!(gpus.device_count(), 0);
        assert!(gpus.gpu_names().is_empty());
        assert_eq!(gpus.utilization(0), None);
    }
}
