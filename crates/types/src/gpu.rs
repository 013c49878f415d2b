//! GPU vendor and metric types shared by the vendor managers and data sources

use serde::{Deserialize, Serialize};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// GPU vendor enumeration
///
/// Declaration order is the precedence order used when the aggregated
/// device index is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
}

impl GpuVendor {
    /// All vendors in precedence order
    pub const ALL: [GpuVendor; 3] = [GpuVendor::Nvidia, GpuVendor::Amd, GpuVendor::Intel];

    pub fn as_str(&self) -> &'static str {
        match self {
            GpuVendor::Nvidia => "NVIDIA",
            GpuVendor::Amd => "AMD",
            GpuVendor::Intel => "Intel",
        }
    }

    /// PCI vendor ID as exposed by `/sys/class/drm/cardN/device/vendor`
    pub fn pci_id(&self) -> u32 {
        match self {
            GpuVendor::Nvidia => 0x10de,
            GpuVendor::Amd => 0x1002,
            GpuVendor::Intel => 0x8086,
        }
    }

    pub fn from_pci_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.pci_id() == id)
    }
}

/// Video memory usage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VramUsage {
    pub used_gb: f64,
    pub total_gb: f64,
    pub percent: f64,
}

impl VramUsage {
    /// Build from raw byte counts. Returns `None` when `total_bytes` is zero.
    pub fn from_bytes(used_bytes: u64, total_bytes: u64) -> Option<Self> {
        if total_bytes == 0 {
            return None;
        }
        Some(Self {
            used_gb: used_bytes as f64 / BYTES_PER_GIB,
            total_gb: total_bytes as f64 / BYTES_PER_GIB,
            percent: used_bytes as f64 / total_bytes as f64 * 100.0,
        })
    }
}

/// Last-read metrics for one GPU
///
/// Every field is independently optional: a failed read for one metric
/// leaves only that field empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuMetrics {
    pub temperature: Option<f32>,       // Temperature in Celsius
    pub utilization: Option<f32>,       // GPU utilization in %
    pub clock_mhz: Option<u32>,         // Graphics clock in MHz
    pub vram: Option<VramUsage>,
    pub power_w: Option<f32>,           // Power draw in Watts
    pub fan_percent: Option<f32>,       // Fan speed in % of max
    pub running_processes: Option<u32>, // Compute processes (NVML only)
}

/// Compute a fan percentage from current and maximum RPM
///
/// A zero or negative maximum yields `None` rather than dividing by zero.
/// Readings above the maximum are capped at 100.
pub fn fan_percent(rpm: i64, max_rpm: i64) -> Option<f32> {
    if max_rpm <= 0 || rpm < 0 {
        return None;
    }
    Some((rpm as f32 / max_rpm as f32 * 100.0).min(100.0))
}
