//! System temperature data source

use anyhow::Result;
use pulsedeck_core::{cache_keys, DataSource, FetchContext, SourceMetadata};
use pulsedeck_types::{PanelSettings, TemperatureReading};
use serde_json::{json, Value};
use std::time::Duration;

/// One temperature sensor picked by label
///
/// `sensor_label` selects the sensor (exact match, then case-insensitive
/// substring). Without a label the first sensor is used.
pub struct SystemTempSource {
    metadata: SourceMetadata,
    settings: PanelSettings,
    sensor_label: String,
}

impl SystemTempSource {
    pub fn new(settings: &PanelSettings) -> Result<Self> {
        Ok(Self {
            metadata: SourceMetadata {
                id: "system_temp".to_string(),
                name: "System Temperature".to_string(),
                description: "Temperature from any hardware sensor".to_string(),
                default_interval: Duration::from_secs(1),
            },
            settings: settings.clone(),
            sensor_label: settings.get_config("sensor_label", ""),
        })
    }

    fn select<'a>(&self, readings: &'a [TemperatureReading]) -> Option<&'a TemperatureReading> {
        if self.sensor_label.is_empty() {
            return readings.first();
        }
        let wanted = self.sensor_label.to_lowercase();
        readings
            .iter()
            .find(|r| r.label == self.sensor_label)
            .or_else(|| readings.iter().find(|r| r.label.to_lowercase().contains(&wanted)))
    }
}

impl DataSource for SystemTempSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn fetch(&self, ctx: &FetchContext) -> Result<Option<Value>> {
        let Some(readings) = ctx.cache.get::<Vec<TemperatureReading>>(cache_keys::TEMPERATURES)
        else {
            return Ok(None);
        };

        match self.select(&readings) {
            Some(reading) => Ok(Some(json!({
                "label": reading.label,
                "temperature": reading.celsius,
                "value": reading.celsius,
            }))),
            None => {
                log::trace!("Temperature sensor '{}' not found", self.sensor_label);
                Ok(None)
            }
        }
    }

    fn settings(&self) -> &PanelSettings {
        &self.settings
    }
}
