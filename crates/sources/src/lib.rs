//! pulsedeck-sources: Hardware probes, GPU vendor managers and data source
//! implementations for PulseDeck.

pub mod command;
mod cpu;
mod fan_speed;
pub mod gpu;
pub mod hwmon;
mod memory;
pub mod sysfs;
mod system;
mod system_temp;
mod systemd;

pub use command::{run_command, safe_command, CommandOutcome};
pub use cpu::{CoreSelection, CpuSource};
pub use fan_speed::FanSpeedSource;
pub use gpu::{detect_gpus, AmdManager, GpuDetectConfig, GpuSource, IntelManager, NvidiaManager};
pub use memory::MemorySource;
pub use system::{cpu_temperature_sensor, SystemPrimer};
pub use system_temp::SystemTempSource;
pub use systemd::SystemdSource;

use pulsedeck_core::{SharedDataSource, SourceRegistry};
use std::sync::Arc;

/// Register all built-in sources
pub fn register_all(registry: &mut SourceRegistry) {
    registry.register_source("cpu", "Cpu", |settings| {
        Ok(Arc::new(CpuSource::new(settings)?) as SharedDataSource)
    });

    registry.register_source("memory", "Memory", |settings| {
        Ok(Arc::new(MemorySource::new(settings)?) as SharedDataSource)
    });

    registry.register_source("system_temp", "System Temperature", |settings| {
        Ok(Arc::new(SystemTempSource::new(settings)?) as SharedDataSource)
    });

    registry.register_source("gpu", "Gpu", |settings| {
        Ok(Arc::new(GpuSource::new(settings)?) as SharedDataSource)
    });

    registry.register_source("fan_speed", "Fan Speed", |settings| {
        Ok(Arc::new(FanSpeedSource::new(settings)?) as SharedDataSource)
    });

    registry.register_source("systemd", "Systemd Services", |settings| {
        Ok(Arc::new(SystemdSource::new(settings)?) as SharedDataSource)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsedeck_types::PanelSettings;

    #[test]
    fn test_register_all() {
        let mut registry = SourceRegistry::new();
        register_all(&mut registry);

        let ids: Vec<&str> = registry.list_sources().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["cpu", "fan_speed", "gpu", "memory", "system_temp", "systemd"]
        );

        let source = registry.create_source("gpu", &PanelSettings::new()).unwrap();
        assert_eq!(source.metadata().id, "gpu");
        assert!(registry.create_source("disk", &PanelSettings::new()).is_err());
    }
}
