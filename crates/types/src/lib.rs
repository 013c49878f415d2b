//! pulsedeck-types: Shared data types for the PulseDeck telemetry engine.
//!
//! This crate contains pure data types (panel identity and settings, GPU
//! metric records, system snapshots) shared by every PulseDeck crate. Nothing
//! here touches hardware or threads.

pub mod gpu;
pub mod panel;
pub mod system;

// Re-export commonly used types at the crate root for convenience
pub use gpu::{fan_percent, GpuMetrics, GpuVendor, VramUsage};
pub use panel::{
    IntervalSetting, PanelId, PanelSettings, DEFAULT_UPDATE_INTERVAL_SECS, UPDATE_INTERVAL_KEY,
};
pub use system::{CpuLoad, FanReading, MemorySnapshot, TemperatureReading};
