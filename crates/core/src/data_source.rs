//! Data source trait and related types

use crate::cycle_cache::CycleCache;
use crate::gpu::GpuAggregator;
use anyhow::Result;
use pulsedeck_types::{IntervalSetting, PanelSettings};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Metadata about a data source
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    /// Unique identifier for this source type
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Description of what this source provides
    pub description: String,
    /// Recommended update interval
    pub default_interval: Duration,
}

/// Shared state handed to every fetch
///
/// Sources never own the cycle cache or the GPU aggregator; the scheduler
/// passes them in so all panels of one tick see the same instances.
#[derive(Clone)]
pub struct FetchContext {
    pub cache: Arc<CycleCache>,
    pub gpus: Arc<GpuAggregator>,
}

impl FetchContext {
    pub fn new(cache: Arc<CycleCache>, gpus: Arc<GpuAggregator>) -> Self {
        Self { cache, gpus }
    }
}

/// Trait for all data sources
///
/// Data sources produce one data point per fetch. `fetch` is called from
/// worker threads and may run concurrently with itself when the overlap
/// policy allows it, so it takes `&self`; sources with mutable state keep
/// it behind their own lock.
pub trait DataSource: Send + Sync {
    /// Get metadata about this source
    fn metadata(&self) -> &SourceMetadata;

    /// Produce one data point
    ///
    /// `Ok(None)` means "no data right now" (sensor missing, device gone).
    /// Errors and panics are both turned into an absent value by the worker
    /// pool and logged with the panel id.
    fn fetch(&self, ctx: &FetchContext) -> Result<Option<Value>>;

    /// Settings the source was created with
    fn settings(&self) -> &PanelSettings;

    /// Read a setting, falling back to `default`
    fn get_config(&self, key: &str, default: &str) -> String {
        self.settings().get_config(key, default)
    }

    /// Refresh interval requested by this source's settings
    fn update_interval(&self) -> IntervalSetting {
        self.settings().update_interval()
    }

    /// Check if this source is available on the current system
    ///
    /// For example, GPU sources are not available if no GPU is present.
    fn is_available(&self, _ctx: &FetchContext) -> bool {
        true
    }
}

/// Type-erased, shareable data source
pub type SharedDataSource = Arc<dyn DataSource>;
