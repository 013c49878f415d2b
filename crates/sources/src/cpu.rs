//! CPU data source implementation

use crate::system::cpu_temperature_sensor;
use anyhow::Result;
use pulsedeck_core::{cache_keys, DataSource, FetchContext, SourceMetadata};
use pulsedeck_types::{CpuLoad, PanelSettings, TemperatureReading};
use serde_json::{json, Value};
use std::time::Duration;

/// Which load figure a panel shows as its `value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreSelection {
    Overall,
    Core(usize),
}

/// CPU data source
///
/// Reads the per-tick CPU snapshot from the cycle cache; it never touches
/// sysinfo itself. Setting `cpu_core` selects `overall` (default) or a core
/// index for the primary value.
pub struct CpuSource {
    metadata: SourceMetadata,
    settings: PanelSettings,
    core: CoreSelection,
}

impl CpuSource {
    pub fn new(settings: &PanelSettings) -> Result<Self> {
        let core_setting = settings.get_config("cpu_core", "overall");
        let core = match core_setting.trim() {
            "overall" | "" => CoreSelection::Overall,
            other => match other.parse::<usize>() {
                Ok(index) => CoreSelection::Core(index),
                Err(_) => {
                    log::warn!("Invalid cpu_core '{}', using overall", other);
                    CoreSelection::Overall
                }
            },
        };

        Ok(Self {
            metadata: SourceMetadata {
                id: "cpu".to_string(),
                name: "CPU Information".to_string(),
                description: "CPU usage, per-core load, frequency and temperature".to_string(),
                default_interval: Duration::from_secs(1),
            },
            settings: settings.clone(),
            core,
        })
    }
}

impl DataSource for CpuSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn fetch(&self, ctx: &FetchContext) -> Result<Option<Value>> {
        let Some(load) = ctx.cache.get::<CpuLoad>(cache_keys::CPU_LOAD) else {
            log::trace!("No CPU snapshot this tick");
            return Ok(None);
        };

        let usage = match self.core {
            CoreSelection::Overall => Some(load.overall),
            CoreSelection::Core(index) => load.per_core.get(index).copied(),
        };

        let temperature = ctx
            .cache
            .get::<Vec<TemperatureReading>>(cache_keys::TEMPERATURES)
            .and_then(|readings| {
                cpu_temperature_sensor(&readings).map(|index| readings[index].celsius)
            });

        Ok(Some(json!({
            "usage": usage,
            "per_core": load.per_core,
            "frequency": load.frequency_mhz,
            "temperature": temperature,
            "value": usage,
        })))
    }

    fn settings(&self) -> &PanelSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsedeck_core::{CycleCache, GpuAggregator};
    use std::sync::Arc;

    fn context() -> FetchContext {
        let cache = Arc::new(CycleCache::new());
        cache.rebuild(|entries| {
            entries.insert(
                cache_keys::CPU_LOAD,
                CpuLoad {
                    overall: 25.0,
                    per_core: vec![10.0, 40.0],
                    frequency_mhz: 3600,
                },
            );
            entries.insert(
                cache_keys::TEMPERATURES,
                vec![TemperatureReading {
                    label: "k10temp Tctl".to_string(),
                    celsius: 58.5,
                }],
            );
        });
        FetchContext::new(cache, Arc::new(GpuAggregator::empty()))
    }

    #[test]
    fn test_overall_usage_from_cache() {
        let source = CpuSource::new(&PanelSettings::new()).unwrap();
        let value = source.fetch(&context()).unwrap().unwrap();
        assert_eq!(value["value"], json!(25.0));
        assert_eq!(value["frequency"], json!(3600));
        assert_eq!(value["temperature"], json!(58.5));
    }

    #[test]
    fn test_core_selection() {
        let settings = PanelSettings::new().with("cpu_core", "1");
        let source = CpuSource::new(&settings).unwrap();
        let value = source.fetch(&context()).unwrap().unwrap();
        assert_eq!(value["value"], json!(40.0));

        let settings = PanelSettings::new().with("cpu_core", "7");
        let source = CpuSource::new(&settings).unwrap();
        let value = source.fetch(&context()).unwrap().unwrap();
        assert_eq!(value["value"], Value::Null);
    }

    #[test]
    fn test_empty_cache_is_absent() {
        let ctx = FetchContext::new(Arc::new(CycleCache::new()), Arc::new(GpuAggregator::empty()));
        let source = CpuSource::new(&PanelSettings::new()).unwrap();
        assert_eq!(source.fetch(&ctx).unwrap(), None);
    }
}
