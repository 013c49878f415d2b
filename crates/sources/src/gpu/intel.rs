//! Intel GPU manager (i915 and xe drivers)
//!
//! Intel exposes neither a busy percentage nor VRAM counters through sysfs,
//! so only clock, temperature, power and fan are reported.

use super::vendor_cards;
use crate::hwmon::Hwmon;
use crate::sysfs;
use pulsedeck_core::{DeviceTable, GpuDevice, VendorManager};
use pulsedeck_types::{GpuMetrics, GpuVendor};
use std::path::PathBuf;
use std::sync::Arc;

/// Current-frequency files, relative to the card directory, in lookup order
const CLOCK_FILES: &[&str] = &[
    "gt_cur_freq_mhz",
    "gt/gt0/rps_cur_freq_mhz",
    "device/tile0/gt0/freq0/act_freq",
];

pub struct IntelProbe {
    card_path: PathBuf,
    hwmon: Option<Hwmon>,
}

impl IntelProbe {
    fn read(&self) -> GpuMetrics {
        let clock_mhz = sysfs::read_first_int(&self.card_path, CLOCK_FILES)
            .and_then(|mhz| u32::try_from(mhz).ok());

        GpuMetrics {
            temperature: self.hwmon.as_ref().and_then(Hwmon::temperature),
            clock_mhz,
            power_w: self.hwmon.as_ref().and_then(Hwmon::power_watts),
            fan_percent: self.hwmon.as_ref().and_then(Hwmon::fan_percent),
            ..Default::default()
        }
    }
}

pub struct IntelManager {
    drm_root: PathBuf,
    table: DeviceTable<IntelProbe>,
}

impl IntelManager {
    pub fn new(drm_root: impl Into<PathBuf>) -> Self {
        Self {
            drm_root: drm_root.into(),
            table: DeviceTable::new(),
        }
    }

    fn enumerate(&self) -> Vec<GpuDevice<IntelProbe>> {
        let devices: Vec<_> = vendor_cards(&self.drm_root, GpuVendor::Intel)
            .into_iter()
            .enumerate()
            .map(|(index, card)| {
                let probe = IntelProbe {
                    hwmon: Hwmon::for_device(&card.device_path),
                    card_path: card.card_path,
                };
                GpuDevice::new(index, format!("Intel GPU {}", index), probe)
            })
            .collect();

        if !devices.is_empty() {
            log::info!("Intel manager found {} GPU(s)", devices.len());
        }
        devices
    }
}

impl VendorManager for IntelManager {
    fn vendor(&self) -> GpuVendor {
        GpuVendor::Intel
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
