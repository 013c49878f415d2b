//! PulseDeck: polling and caching update engine for telemetry panels
//!
//! The engine ticks on a fixed period, refreshes a per-tick cache of shared
//! system reads and the GPU aggregator, fetches every due panel on a bounded
//! worker pool and hands the results to a single presentation context.
//!
//! Data sources live in `pulsedeck-sources`; the traits, the cycle cache and
//! GPU aggregation live in `pulsedeck-core`.

pub mod config;
pub mod core;
pub mod error;

// Re-export commonly used types
pub use config::{AppConfig, EngineSettings, GpuSettings, PanelConfig};
pub use core::{Delivery, FetchResult, OverlapPolicy, TickReport, UpdateManager, WorkerPool};
pub use error::{EngineError, PoolError};
pub use pulsedeck_core::{DataSource, FetchContext, GpuAggregator, SharedDataSource};
pub use pulsedeck_types::PanelId;
