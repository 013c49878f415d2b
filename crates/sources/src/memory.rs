//! Memory (RAM) data source implementation

use anyhow::Result;
use pulsedeck_core::{cache_keys, DataSource, FetchContext, SourceMetadata};
use pulsedeck_types::{MemorySnapshot, PanelSettings};
use serde_json::{json, Value};
use std::time::Duration;

/// Memory data source
///
/// RAM and swap usage from the per-tick memory snapshot. The primary
/// `value` is the RAM usage percentage, or swap with `memory_field = swap`.
pub struct MemorySource {
    metadata: SourceMetadata,
    settings: PanelSettings,
    show_swap: bool,
}

impl MemorySource {
    pub fn new(settings: &PanelSettings) -> Result<Self> {
        let show_swap = settings.get_config("memory_field", "ram") == "swap";
        Ok(Self {
            metadata: SourceMetadata {
                id: "memory".to_string(),
                name: "Memory (RAM)".to_string(),
                description: "System memory (RAM) and swap usage".to_string(),
                default_interval: Duration::from_secs(1),
            },
            settings: settings.clone(),
            show_swap,
        })
    }
}

impl DataSource for MemorySource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn fetch(&self, ctx: &FetchContext) -> Result<Option<Value>> {
        let Some(mem) = ctx.cache.get::<MemorySnapshot>(cache_keys::MEMORY) else {
            return Ok(None);
        };

        let percent = mem.used_percent();
        let swap_percent = mem.swap_percent();
        let value = if self.show_swap { swap_percent } else { percent };

        Ok(Some(json!({
            "total": mem.total,
            "used": mem.used,
            "available": mem.available,
            "percent": percent,
            "swap_total": mem.total_swap,
            "swap_used": mem.used_swap,
            "swap_percent": swap_percent,
            "value": value,
        })))
    }

    fn settings(&self) -> &PanelSettings {
        &self.settings
    }
}
