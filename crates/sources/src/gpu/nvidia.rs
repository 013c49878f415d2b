//! NVIDIA GPU manager
//!
//! Uses NVML when built with the `nvidia` feature and the library loads.
//! Otherwise devices are counted from DRM vendor IDs and whatever the card's
//! hwmon directory offers is reported (usually nothing with the proprietary
//! driver, temperature with nouveau).

use super::vendor_cards;
use crate::hwmon::Hwmon;
use pulsedeck_core::{DeviceTable, GpuDevice, VendorManager};
use pulsedeck_types::{GpuMetrics, GpuVendor};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "nvidia")]
use nvml_wrapper::{
    enum_wrappers::device::{Clock, TemperatureSensor},
    Nvml,
};
#[cfg(feature = "nvidia")]
use once_cell::sync::OnceCell;
#[cfg(feature = "nvidia")]
use pulsedeck_types::VramUsage;

/// How metrics for one device are read
pub enum NvidiaProbe {
    #[cfg(feature = "nvidia")]
    Nvml { index: u32 },
    Sysfs { hwmon: Option<Hwmon> },
}

pub struct NvidiaManager {
    drm_root: PathBuf,
    use_nvml: bool,
    table: DeviceTable<NvidiaProbe>,
    #[cfg(feature = "nvidia")]
    nvml: OnceCell<Nvml>,
}

impl NvidiaManager {
    /// `use_nvml = false` skips the library and goes straight to sysfs
    pub fn new(drm_root: impl Into<PathBuf>, use_nvml: bool) -> Self {
        Self {
            drm_root: drm_root.into(),
            use_nvml,
            table: DeviceTable::new(),
            #[cfg(feature = "nvidia")]
            nvml: OnceCell::new(),
        }
    }

    /// Whether devices are read through NVML
    pub fn nvml_active(&self) -> bool {
        #[cfg(feature = "nvidia")]
        {
            self.nvml.get().is_some()
        }
        #[cfg(not(feature = "nvidia"))]
        {
            false
        }
    }

    fn enumerate(&self) -> Vec<GpuDevice<NvidiaProbe>> {
        if self.use_nvml {
            #[cfg(feature = "nvidia")]
            if let Some(devices) = self.enumerate_nvml() {
                return devices;
            }
            #[cfg(not(feature = "nvidia"))]
            log::info!("NVML support not compiled in, using sysfs for NVIDIA GPUs");
        }
        self.enumerate_sysfs()
    }

    #[cfg(feature = "nvidia")]
    fn enumerate_nvml(&self) -> Option<Vec<GpuDevice<NvidiaProbe>>> {
        let nvml = match Nvml::init() {
            Ok(nvml) => nvml,
            Err(e) => {
                log::info!("NVML not available ({}), falling back to sysfs", e);
                return None;
            }
        };

        let count = match nvml.device_count() {
            Ok(count) => count,
            Err(e) => {
                log::warn!("NVML device count failed ({}), falling back to sysfs", e);
                return None;
            }
        };

        let devices: Vec<_> = (0..count)
            .map(|index| {
                let name = nvml
                    .device_by_index(index)
                    .and_then(|device| device.name())
                    .unwrap_or_else(|_| format!("NVIDIA GPU {}", index));
                GpuDevice::new(index as usize, name, NvidiaProbe::Nvml { index })
            })
            .collect();

        log::info!("NVML initialized: {} NVIDIA GPU(s)", devices.len());
        let _ = self.nvml.set(nvml);
        Some(devices)
    }

    fn enumerate_sysfs(&self) -> Vec<GpuDevice<NvidiaProbe>> {
        let devices: Vec<_> = vendor_cards(&self.drm_root, GpuVendor::Nvidia)
            .into_iter()
            .enumerate()
            .map(|(index, card)| {
                let hwmon = Hwmon::for_device(&card.device_path);
                GpuDevice::new(index, format!("NVIDIA GPU {}", index), NvidiaProbe::Sysfs { hwmon })
            })
            .collect();

        if !devices.is_empty() {
            log::info!("Found {} NVIDIA GPU(s) via sysfs", devices.len());
        }
        devices
    }

    fn read(&self, probe: &NvidiaProbe) -> GpuMetrics {
        match probe {
            #[cfg(feature = "nvidia")]
            NvidiaProbe::Nvml { index } => self.read_nvml(*index),
            NvidiaProbe::Sysfs { hwmon: Some(hwmon) } => GpuMetrics {
                temperature: hwmon.temperature(),
                power_w: hwmon.power_watts(),
                fan_percent: hwmon.fan_percent(),
                ..Default::default()
            },
            NvidiaProbe::Sysfs { hwmon: None } => GpuMetrics::default(),
        }
    }

    #[cfg(feature = "nvidia")]
    fn read_nvml(&self, index: u32) -> GpuMetrics {
        let Some(nvml) = self.nvml.get() else {
            return GpuMetrics::default();
        };
        let device = match nvml.device_by_index(index) {
            Ok(device) => device,
            Err(e) => {
                log::debug!("NVML device {} unavailable: {}", index, e);
                return GpuMetrics::default();
            }
        };

        GpuMetrics {
            temperature: device
                .temperature(TemperatureSensor::Gpu)
                .ok()
                .map(|t| t as f32),
            utilization: device.utilization_rates().ok().map(|u| u.gpu as f32),
            clock_mhz: device.clock_info(Clock::Graphics).ok(),
            vram: device
                .memory_info()
                .ok()
                .and_then(|mem| VramUsage::from_bytes(mem.used, mem.total)),
            // mW to W
            power_w: device.power_usage().ok().map(|p| p as f32 / 1000.0),
            fan_percent: device.fan_speed(0).ok().map(|f| f as f32),
            running_processes: device
                .running_compute_processes()
                .ok()
                .map(|procs| procs.len() as u32),
        }
    }
}

impl VendorManager for NvidiaManager {
    fn vendor(&self) -> GpuVendor {
        GpuVendor::Nvidia
    }

    fn init(&self) {
        self.table.init_with(|| self.enumerate());
    }

    fn update(&self) {
        for device in self.table.devices() {
            device.store(self.read(&device.probe));
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
