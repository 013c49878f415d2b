//! Multi-vendor GPU abstraction
//!
//! Each vendor (NVIDIA, AMD, Intel) implements [`VendorManager`]: one-time
//! device discovery in `init`, a bulk hardware refresh in `update`, and cheap
//! getters that only read the last refreshed snapshot. [`GpuAggregator`]
//! stitches the vendors into one zero-based device index space.

use arc_swap::ArcSwap;
use once_cell::sync::OnceCell;
use pulsedeck_types::{GpuMetrics, GpuVendor, VramUsage};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// One enumerated GPU with its vendor-specific probe handle
///
/// The metrics record is replaced wholesale on every update, so readers see
/// either the previous snapshot or the new one, never a mix.
pub struct GpuDevice<P> {
    pub index: usize,
    pub name: String,
    pub probe: P,
    metrics: ArcSwap<GpuMetrics>,
}

impl<P> GpuDevice<P> {
    pub fn new(index: usize, name: impl Into<String>, probe: P) -> Self {
        Self {
            index,
            name: name.into(),
            probe,
            metrics: ArcSwap::from_pointee(GpuMetrics::default()),
        }
    }

    /// Current snapshot (cheap Arc clone, no I/O)
    pub fn metrics(&self) -> Arc<GpuMetrics> {
        self.metrics.load_full()
    }

    /// Publish a freshly read record
    pub fn store(&self, metrics: GpuMetrics) {
        self.metrics.store(Arc::new(metrics));
    }
}

/// Write-once list of a vendor's devices
pub struct DeviceTable<P> {
    devices: OnceCell<Vec<GpuDevice<P>>>,
}

impl<P> DeviceTable<P> {
    pub const fn new() -> Self {
        Self {
            devices: OnceCell::new(),
        }
    }

    /// Run `enumerate` if this table has never been initialized
    ///
    /// Returns `true` only for the call that actually performed enumeration.
    pub fn init_with<F>(&self, enumerate: F) -> bool
    where
        F: FnOnce() -> Vec<GpuDevice<P>>,
    {
        let mut ran = false;
        self.devices.get_or_init(|| {
            ran = true;
            enumerate()
        });
        ran
    }

    pub fn is_initialized(&self) -> bool {
        self.devices.get().is_some()
    }

    /// Devices found at init (empty before init)
    pub fn devices(&self) -> &[GpuDevice<P>] {
        self.devices.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, index: usize) -> Option<&GpuDevice<P>> {
        self.devices().get(index)
    }

    pub fn len(&self) -> usize {
        self.devices().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices().is_empty()
    }
}

impl<P> Default for DeviceTable<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability interface every GPU vendor backend implements
///
/// `init` never fails: a vendor whose library or devices are missing simply
/// reports zero devices. `update` does all the I/O. Getters read the cached
/// snapshot and return `None` for unsupported metrics or unknown indices.
pub trait VendorManager: Send + Sync {
    fn vendor(&self) -> GpuVendor;

    /// Enumerate devices. Only the first call has any effect.
    fn init(&self);

    /// Re-read every metric of every device and publish new snapshots
    fn update(&self);

    fn device_count(&self) -> usize;

    fn device_name(&self, index: usize) -> Option<String>;

    /// Last published snapshot for a device
    fn metrics(&self, index: usize) -> Option<Arc<GpuMetrics>>;

    fn is_available(&self) -> bool {
        self.device_count() > 0
    }

    /// Local index → name for every device of this vendor
    fn gpu_names(&self) -> BTreeMap<usize, String> {
        (0..self.device_count())
            .filter_map(|i| self.device_name(i).map(|name| (i, name)))
            .collect()
    }

    fn temperature(&self, index: usize) -> Option<f32> {
        self.metrics(index)?.temperature
    }

    fn utilization(&self, index: usize) -> Option<f32> {
        self.metrics(index)?.utilization
    }

    fn graphics_clock(&self, index: usize) -> Option<u32> {
        self.metrics(index)?.clock_mhz
    }

    fn vram_usage(&self, index: usize) -> Option<VramUsage> {
        self.metrics(index)?.vram
    }

    fn power_usage(&self, index: usize) -> Option<f32> {
        self.metrics(index)?.power_w
    }

    fn fan_speed(&self, index: usize) -> Option<f32> {
        self.metrics(index)?.fan_percent
    }

    fn running_processes(&self, index: usize) -> Option<u32> {
        self.metrics(index)?.running_processes
    }
}

/// Global device index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuSlot {
    pub vendor: GpuVendor,
    /// Position of the owning manager in the aggregator
    manager: usize,
    pub local_index: usize,
}

/// Single addressable device space across all vendors
///
/// Managers are kept in the order they were supplied (NVIDIA, AMD, Intel for
/// the detected set); global indices concatenate their devices in that order.
/// The mapping is built once on `init` and never changes afterwards.
pub struct GpuAggregator {
    managers: Vec<Box<dyn VendorManager>>,
    slots: OnceCell<Vec<GpuSlot>>,
}

impl GpuAggregator {
    pub fn new(managers: Vec<Box<dyn VendorManager>>) -> Self {
        Self {
            managers,
            slots: OnceCell::new(),
        }
    }

    /// Aggregator with no vendors (every getter returns `None`)
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Initialize all vendor managers and build the global index
    pub fn init(&self) {
        self.slots.get_or_init(|| {
            let mut slots = Vec::new();
            for (manager_pos, manager) in self.managers.iter().enumerate() {
                manager.init();
                let count = manager.device_count();
                if count == 0 {
                    log::info!("{}: no devices available", manager.vendor().as_str());
                }
                for local_index in 0..count {
                    slots.push(GpuSlot {
                        vendor: manager.vendor(),
                        manager: manager_pos,
                        local_index,
                    });
                }
            }
            log::warn!("GPU aggregator initialized: {} device(s) total", slots.len());
            slots
        });
    }

    /// Refresh every vendor's cached metrics
    ///
    /// A vendor that panics keeps its previous snapshot; the others are
    /// still refreshed.
    pub fn update(&self) {
        if self.slots.get().is_none() {
            log::debug!("GPU aggregator updated before init, initializing now");
            self.init();
        }
        for manager in &self.managers {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| manager.update())) {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("{} GPU update panicked: {}", manager.vendor().as_str(), reason);
            }
        }
    }

    pub fn device_count(&self) -> usize {
        self.slots.get().map_or(0, Vec::len)
    }

    /// Resolve a global index to `(vendor, local index)`
    pub fn resolve(&self, index: usize) -> Option<(GpuVendor, usize)> {
        self.slot(index).map(|slot| (slot.vendor, slot.local_index))
    }

    /// Global index → device name, in precedence order
    pub fn gpu_names(&self) -> BTreeMap<usize, String> {
        self.slots
            .get()
            .map(|slots| {
                slots
                    .iter()
                    .enumerate()
                    .map(|(global, slot)| {
                        let name = self.managers[slot.manager]
                            .device_name(slot.local_index)
                            .unwrap_or_else(|| format!("Unknown {} GPU", slot.vendor.as_str()));
                        (global, name)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn vendors(&self) -> Vec<GpuVendor> {
        self.managers.iter().map(|m| m.vendor()).collect()
    }

    pub fn metrics(&self, index: usize) -> Option<Arc<GpuMetrics>> {
        self.with_manager(index, |m, local| m.metrics(local))
    }

    pub fn temperature(&self, index: usize) -> Option<f32> {
        self.with_manager(index, |m, local| m.temperature(local))
    }

    pub fn utilization(&self, index: usize) -> Option<f32> {
        self.with_manager(index, |m, local| m.utilization(local))
    }

    pub fn graphics_clock(&self, index: usize) -> Option<u32> {
        self.with_manager(index, |m, local| m.graphics_clock(local))
    }

    pub fn vram_usage(&self, index: usize) -> Option<VramUsage> {
        self.with_manager(index, |m, local| m.vram_usage(local))
    }

    pub fn power_usage(&self, index: usize) -> Option<f32> {
        self.with_manager(index, |m, local| m.power_usage(local))
    }

    pub fn fan_speed(&self, index: usize) -> Option<f32> {
        self.with_manager(index, |m, local| m.fan_speed(local))
    }

    pub fn running_processes(&self, index: usize) -> Option<u32> {
        self.with_manager(index, |m, local| m.running_processes(local))
    }

    fn slot(&self, index: usize) -> Option<&GpuSlot> {
        self.slots.get()?.get(index)
    }

    fn with_manager<T>(
        &self,
        index: usize,
        f: impl FnOnce(&dyn VendorManager, usize) -> Option<T>,
    ) -> Option<T> {
        let slot = self.slot(index)?;
        f(self.managers[slot.manager].as_ref(), slot.local_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Vendor manager with a fixed device list and a counter per call
    struct FakeVendor {
        vendor: GpuVendor,
        table: DeviceTable<()>,
        names: Vec<&'static str>,
        updates: AtomicUsize,
        inits: AtomicUsize,
        panic_on_update: bool,
    }

    impl FakeVendor {
        fn new(vendor: GpuVendor, names: Vec<&'static str>) -> Self {
            Self {
                vendor,
                table: DeviceTable::new(),
                names,
                updates: AtomicUsize::new(0),
                inits: AtomicUsize::new(0),
                panic_on_update: false,
            }
        }

        fn panicking(vendor: GpuVendor, names: Vec<&'static str>) -> Self {
            Self {
                panic_on_update: true,
                ..Self::new(vendor, names)
            }
        }
    }

    impl VendorManager for FakeVendor {
        fn vendor(&self) -> GpuVendor {
            self.vendor
        }

        fn init(&self) {
            self.table.init_with(|| {
                self.inits.fetch_add(1, Ordering::SeqCst);
                self.names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| GpuDevice::new(i, *name, ()))
                    .collect()
            });
        }

        fn update(&self) {
            let n = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic_on_update {
                panic!("driver call failed");
            }
            for device in self.table.devices() {
                device.store(GpuMetrics {
                    temperature: Some(40.0 + device.index as f32),
                    utilization: Some(n as f32),
                    ..Default::default()
                });
            }
        }

        fn device_count(&self) -> usize {
            self.table.len()
        }

        fn device_name(&self, index: usize) -> Option<String> {
            self.table.get(index).map(|d| d.name.clone())
        }

        fn metrics(&self, index: usize) -> Option<Arc<GpuMetrics>> {
            self.table.get(index).map(GpuDevice::metrics)
        }
    }

    fn aggregator() -> GpuAggregator {
        GpuAggregator::new(vec![
            Box::new(FakeVendor::new(GpuVendor::Nvidia, vec!["RTX 4070"])),
            Box::new(FakeVendor::new(GpuVendor::Amd, vec!["RX 7900 XT", "RX 6600"])),
            Box::new(FakeVendor::new(GpuVendor::Intel, vec![])),
        ])
    }

    #[test]
    fn test_global_index_follows_vendor_precedence() {
        let gpus = aggregator();
        gpus.init();

        assert_eq!(gpus.device_count(), 3);
        assert_eq!(gpus.resolve(0), Some((GpuVendor::Nvidia, 0)));
        assert_eq!(gpus.resolve(1), Some((GpuVendor::Amd, 0)));
        assert_eq!(gpus.resolve(2), Some((GpuVendor::Amd, 1)));
        assert_eq!(gpus.resolve(3), None);

        let names = gpus.gpu_names();
        assert_eq!(names.get(&0).map(String::as_str), Some("RTX 4070"));
        assert_eq!(names.get(&1).map(String::as_str), Some("RX 7900 XT"));
        assert_eq!(names.get(&2).map(String::as_str), Some("RX 6600"));
    }

    #[test]
    fn test_getters_delegate_to_owning_vendor() {
        let gpus = aggregator();
        gpus.init();
        gpus.update();

        // AMD local index 1 → temperature 41
        assert_eq!(gpus.temperature(2), Some(41.0));
        assert_eq!(gpus.utilization(0), Some(1.0));
        assert_eq!(gpus.graphics_clock(0), None);
        assert_eq!(gpus.temperature(9), None);
    }

    #[test]
    fn test_vendor_panic_does_not_skip_other_vendors() {
        let gpus = GpuAggregator::new(vec![
            Box::new(FakeVendor::panicking(GpuVendor::Nvidia, vec!["RTX 4070"])),
            Box::new(FakeVendor::new(GpuVendor::Amd, vec!["RX 7900 XT"])),
        ]);
        gpus.init();
        gpus.update();

        assert_eq!(gpus.temperature(0), None);
        assert_eq!(gpus.temperature(1), Some(40.0));

        // Still contained on the next refresh
        gpus.update();
        assert_eq!(gpus.utilization(1), Some(2.0));
    }

    #[test]
    fn test_init_is_idempotent() {
        let vendor = FakeVendor::new(GpuVendor::Amd, vec!["a"]);
        vendor.init();
        vendor.init();
        assert_eq!(vendor.inits.load(Ordering::SeqCst), 1);

        let gpus = aggregator();
        gpus.init();
        gpus.init();
        assert_eq!(gpus.device_count(), 3);
    }

    #[test]
    fn test_empty_aggregator_returns_none() {
        let gpus = GpuAggregator::empty();
        gpus.init();
        gpus.update();
        assert_eq!(gpus.device_count(), 0);
        assert!(gpus.gpu_names().is_empty());
        assert_eq!(gpus.temperature(0), None);
        assert_eq!(gpus.vram_usage(0), None);
    }

    #[test]
    fn test_getters_before_update_are_none() {
        let gpus = aggregator();
        gpus.init();
        assert_eq!(gpus.temperature(0), None);
        assert_eq!(gpus.fan_speed(1), None);
    }

    #[test]
    fn test_device_store_swaps_whole_record() {
        let device = GpuDevice::new(0, "gpu", ());
        let before = device.metrics();
        device.store(GpuMetrics {
            temperature: Some(55.0),
            power_w: Some(120.0),
            ..Default::default()
        });
        let after = device.metrics();

        // The old snapshot is untouched by the store
        assert_eq!(before.temperature, None);
        assert_eq!(after.temperature, Some(55.0));
        assert_eq!(after.power_w, Some(120.0));
    }
}
