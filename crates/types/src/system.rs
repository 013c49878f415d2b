//! System-wide snapshot types stored in the per-tick cycle cache

use serde::{Deserialize, Serialize};

/// Aggregate and per-core CPU load in percent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuLoad {
    pub overall: f32,
    pub per_core: Vec<f32>,
    /// Frequency of the first core in MHz
    pub frequency_mhz: u64,
}

/// Memory and swap usage in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub total_swap: u64,
    pub used_swap: u64,
}

impl MemorySnapshot {
    pub fn used_percent(&self) -> Option<f64> {
        (self.total > 0).then(|| self.used as f64 / self.total as f64 * 100.0)
    }

    pub fn swap_percent(&self) -> Option<f64> {
        (self.total_swap > 0).then(|| self.used_swap as f64 / self.total_swap as f64 * 100.0)
    }
}

/// One temperature sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub label: String,
    pub celsius: f32,
}

/// One fan speed reading from hwmon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanReading {
    pub label: String,
    pub rpm: u32,
}
