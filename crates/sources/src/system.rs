//! Eager per-tick system snapshot (CPU load, memory, temperatures)
//!
//! One `sysinfo::System` and one `Components` list are owned by the primer and
//! refreshed once per tick on the scheduler thread. Sources read the results
//! from the cycle cache instead of keeping their own sysinfo instances.

use pulsedeck_core::{cache_keys, CachePrimer, CycleEntries};
use pulsedeck_types::{CpuLoad, MemorySnapshot, TemperatureReading};
use sysinfo::{Components, CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

pub struct SystemPrimer {
    system: System,
    components: Components,
}

impl SystemPrimer {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        // Sensor discovery is the slow part, do it once
        let components = Components::new_with_refreshed_list();
        log::info!(
            "System primer initialized: {} CPU(s), {} temperature sensor(s)",
            system.cpus().len(),
            components.len()
        );

        Self { system, components }
    }

    fn cpu_load(&self) -> CpuLoad {
        let cpus = self.system.cpus();
        CpuLoad {
            overall: self.system.global_cpu_usage(),
            per_core: cpus.iter().map(|cpu| cpu.cpu_usage()).collect(),
            frequency_mhz: cpus.first().map_or(0, |cpu| cpu.frequency()),
        }
    }

    fn memory(&self) -> MemorySnapshot {
        MemorySnapshot {
            total: self.system.total_memory(),
            used: self.system.used_memory(),
            available: self.system.available_memory(),
            total_swap: self.system.total_swap(),
            used_swap: self.system.used_swap(),
        }
    }

    fn temperatures(&self) -> Vec<TemperatureReading> {
        self.components
            .iter()
            .map(|c| TemperatureReading {
                label: c.label().to_string(),
                celsius: c.temperature(),
            })
            .filter(|reading| reading.celsius.is_finite())
            .collect()
    }
}

impl Default for SystemPrimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CachePrimer for SystemPrimer {
    fn name(&self) -> &str {
        "system"
    }

    fn prime(&mut self, entries: &mut CycleEntries<'_>) {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh();

        entries.insert(cache_keys::CPU_LOAD, self.cpu_load());
        entries.insert(cache_keys::MEMORY, self.memory());
        entries.insert(cache_keys::TEMPERATURES, self.temperatures());
    }
}

/// Index of the sensor that best represents the CPU package temperature
///
/// Package-level labels (`cpu`, `package`, `tctl`) win over per-core ones.
pub fn cpu_temperature_sensor(readings: &[TemperatureReading]) -> Option<usize> {
    let label_matches = |needles: &[&str]| {
        readings.iter().position(|r| {
            let label = r.label.to_lowercase();
            needles.iter().any(|needle| label.contains(needle))
        })
    };
    label_matches(&["cpu", "package", "tctl"]).or_else(|| label_matches(&["core"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsedeck_core::CycleCache;

    fn reading(label: &str, celsius: f32) -> TemperatureReading {
        TemperatureReading {
            label: label.to_string(),
            celsius,
        }
    }

    #[test]
    fn test_primer_fills_system_keys() {
        let cache = CycleCache::new();
        let mut primer = SystemPrimer::new();
        cache.rebuild(|entries| primer.prime(entries));

        assert!(cache.contains_key(cache_keys::CPU_LOAD));
        assert!(cache.contains_key(cache_keys::TEMPERATURES));
        let memory = cache.get::<MemorySnapshot>(cache_keys::MEMORY).unwrap();
        assert!(memory.total > 0);
        let load = cache.get::<CpuLoad>(cache_keys::CPU_LOAD).unwrap();
        assert!(!load.per_core.is_empty());
    }

    #[test]
    fn test_cpu_sensor_prefers_package() {
        let readings = vec![
            reading("nvme Composite", 38.0),
            reading("coretemp Core 0", 51.0),
            reading("coretemp Package id 0", 55.0),
        ];
        assert_eq!(cpu_temperature_sensor(&readings), Some(2));

        let cores_only = vec![reading("acpitz", 30.0), reading("Core 1", 49.0)];
        assert_eq!(cpu_temperature_sensor(&cores_only), Some(1));
        assert_eq!(cpu_temperature_sensor(&[reading("acpitz", 30.0)]), None);
    }
}
