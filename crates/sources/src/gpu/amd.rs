//! AMD GPU manager using the amdgpu sysfs interface

use super::vendor_cards;
use crate::hwmon::Hwmon;
use crate::sysfs;
use pulsedeck_core::{DeviceTable, GpuDevice, VendorManager};
use pulsedeck_types::{GpuMetrics, GpuVendor, VramUsage};
use std::path::PathBuf;
use std::sync::Arc;

/// Files read for one AMD card
pub struct AmdProbe {
    device_path: PathBuf,
    hwmon: Option<Hwmon>,
}

impl AmdProbe {
    fn read(&self) -> GpuMetrics {
        let device = &self.device_path;
        let vram = match (
            sysfs::read_u64(&device.join("mem_info_vram_used")),
            sysfs::read_u64(&device.join("mem_info_vram_total")),
        ) {
            (Some(used), Some(total)) => VramUsage::from_bytes(used, total),
            _ => None,
        };

        GpuMetrics {
            temperature: self.hwmon.as_ref().and_then(Hwmon::temperature),
            utilization: sysfs::read_int(&device.join("gpu_busy_percent")).map(|v| v as f32),
            clock_mhz: sysfs::read_active_dpm_clock(&device.join("pp_dpm_sclk")),
            vram,
            power_w: self.hwmon.as_ref().and_then(Hwmon::power_watts),
            fan_percent: self.hwmon.as_ref().and_then(Hwmon::fan_percent),
            running_processes: None,
        }
    }
}

/// AMD GPUs found under the DRM class directory
pub struct AmdManager {
    drm_root: PathBuf,
    table: DeviceTable<AmdProbe>,
}

impl AmdManager {
    pub fn new(drm_root: impl Into<PathBuf>) -> Self {
        Self {
            drm_root: drm_root.into(),
            table: DeviceTable::new(),
        }
    }

    fn enumerate(&self) -> Vec<GpuDevice<AmdProbe>> {
        let devices: Vec<_> = vendor_cards(&self.drm_root, GpuVendor::Amd)
            .into_iter()
            .enumerate()
            .map(|(index, card)| {
                let name = sysfs::read_hex(&card.device_path.join("device"))
                    .and_then(radeon_name)
                    .unwrap_or_else(|| format!("AMD GPU {}", index));
                let hwmon = Hwmon::for_device(&card.device_path);
                if hwmon.is_none() {
                    log::debug!("card{} has no hwmon directory", card.number);
                }
                log::debug!("AMD GPU {}: {} (card{})", index, name, card.number);
                GpuDevice::new(
                    index,
                    name,
                    AmdProbe {
                        device_path: card.device_path,
                        hwmon,
                    },
                )
            })
            .collect();

        if !devices.is_empty() {
            log::info!("AMD manager found {} GPU(s)", devices.len());
        }
        devices
    }
}

impl VendorManager for AmdManager {
    fn vendor(&self) -> GpuVendor {
        GpuVendor::Amd
    }

    fn init(&self) {
        self.table.init_with(|| self.enumerate());
    }

    fn update(&self) {
        for device in self.table.devices() {
            device.store(device.probe.read());
        }
    }

    fn device_count(&self) -> usize {
        self.table.len()
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.table.get(index).map(|d| d.name.clone())
    }

    fn metrics(&self, index: usize) -> Option<Arc<GpuMetrics>> {
        self.table.get(index).map(GpuDevice::metrics)
    }
}

/// Marketing name for a handful of common PCI device IDs
fn radeon_name(device_id: u32) -> Option<String> {
    let name = match device_id {
        0x67DF => "RX 480/470",
        0x67EF => "RX 460",
        0x687F => "Vega 56/64",
        0x6863 => "Vega Frontier Edition",
        0x731F => "RX 5700 XT",
        0x7340 => "RX 5500 XT",
        0x73BF => "RX 6800/6900 XT",
        0x73DF => "RX 6700 XT",
        0x73FF => "RX 6600/6600 XT",
        0x744C => "RX 7900 XTX/XT",
        0x7480 => "RX 7600",
        _ => return None,
    };
    Some(format!("AMD Radeon {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing::FakeDrm;

    #[test]
    fn test_reads_amdgpu_files() {
        let drm = FakeDrm::new();
        let device = drm.card(0, 0x1002);
        drm.write(&device, "device", "0x744c");
        drm.write(&device, "gpu_busy_percent", "37");
        drm.write(&device, "pp_dpm_sclk", "0: 500Mhz\n1: 1800Mhz *\n2: 2500Mhz\n");
        drm.write(&device, "mem_info_vram_used", &(4u64 << 30).to_string());
        drm.write(&device, "mem_info_vram_total", &(16u64 << 30).to_string());
        let hwmon = drm.hwmon(&device, 3);
        drm.write(&hwmon, "temp1_input", "61000");
        drm.write(&hwmon, "power1_average", "212000000");
        drm.write(&hwmon, "fan1_input", "1000");
        drm.write(&hwmon, "fan1_max", "4000");

        let amd = AmdManager::new(drm.root());
        amd.init();
        amd.update();

        assert_eq!(amd.device_count(), 1);
        assert_eq!(amd.device_name(0).as_deref(), Some("AMD Radeon RX 7900 XTX/XT"));
        assert_eq!(amd.temperature(0), Some(61.0));
        assert_eq!(amd.utilization(0), Some(37.0));
        assert_eq!(amd.graphics_clock(0), Some(1800));
        assert_eq!(amd.power_usage(0), Some(212.0));
        assert_eq!(amd.fan_speed(0), Some(25.0));
        let vram = amd.vram_usage(0).unwrap();
        assert!((vram.percent - 25.0).abs() < 1e-9);
        assert_eq!(amd.running_processes(0), None);
    }

    #[test]
    fn test_missing_files_leave_fields_empty() {
        let drm = FakeDrm::new();
        let device = drm.card(1, 0x1002);
        drm.write(&device, "gpu_busy_percent", "5");
        drm.write(&device, "mem_info_vram_used", "100");
        drm.write(&device, "mem_info_vram_total", "0");

        let amd = AmdManager::new(drm.root());
        amd.init();
        amd.update();

        assert_eq!(amd.device_name(0).as_deref(), Some("AMD GPU 0"));
        assert_eq!(amd.utilization(0), Some(5.0));
        assert_eq!(amd.temperature(0), None);
        assert_eq!(amd.fan_speed(0), None);
        assert_eq!(amd.vram_usage(0), None);
    }

    #[test]
    fn test_ignores_other_vendors_and_unknown_index() {
        let drm = FakeDrm::new();
        drm.card(0, 0x10de);
        drm.card(1, 0x8086);

        let amd = AmdManager::new(drm.root());
        amd.init();
        amd.update();

        assert_eq!(amd.device_count(), 0);
        assert!(!amd.is_available());
        assert_eq!(amd.temperature(0), None);
        assert!(amd.gpu_names().is_empty());
    }
}
