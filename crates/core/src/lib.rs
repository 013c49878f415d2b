//! pulsedeck-core: Core traits and shared engine state for PulseDeck.
//!
//! This crate contains the `DataSource` trait, the source registry, the
//! per-tick `CycleCache`, the `VendorManager` capability trait and the
//! `GpuAggregator` that unifies vendor backends, plus shared constants.

pub mod constants;
mod cycle_cache;
mod data_source;
pub mod gpu;
mod registry;

pub use constants::{
    cache_keys, DEFAULT_COMMAND_TIMEOUT, DEFAULT_DRM_ROOT, DEFAULT_HWMON_ROOT,
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TICK_INTERVAL, WORKER_HEADROOM,
};
pub use cycle_cache::{CachePrimer, CycleCache, CycleEntries};
pub use data_source::{DataSource, FetchContext, SharedDataSource, SourceMetadata};
pub use gpu::{DeviceTable, GpuAggregator, GpuDevice, VendorManager};
pub use registry::{SourceFactory, SourceInfo, SourceRegistry};

// Re-export types used in trait signatures for convenience
pub use pulsedeck_types::{GpuMetrics, GpuVendor, PanelId, PanelSettings, VramUsage};
