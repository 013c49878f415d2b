//! Per-tick shared cache of expensive system reads
//!
//! The cache lives for exactly one scheduler tick. At the start of every tick
//! the scheduler clears it and eagerly repopulates the system-wide keys almost
//! every source needs (see [`crate::constants::cache_keys`]). Anything else is
//! computed on first use with [`CycleCache::get_or_compute`], so several panels
//! reading the same key in one tick trigger a single expensive call.

use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

type CachedValue = Arc<dyn Any + Send + Sync>;

/// One key's slot. The `OnceCell` guarantees a single initializer even when
/// several workers race on the same missing key.
type Slot = Arc<OnceCell<CachedValue>>;

/// Per-tick memo of computed values keyed by string
///
/// Values are opaque to the cache; callers pick the type when reading.
pub struct CycleCache {
    entries: RwLock<HashMap<String, Slot>>,
    tick: AtomicU64,
}

impl CycleCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            tick: AtomicU64::new(0),
        }
    }

    /// Number of the tick whose values the cache currently holds
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Start a new tick: clear every entry, then let `populate` fill the
    /// eager keys while the write lock is still held
    ///
    /// Readers block for the duration of `populate`, so no reader can observe
    /// the cache between the clear and the repopulation.
    pub fn rebuild<F>(&self, populate: F) -> u64
    where
        F: FnOnce(&mut CycleEntries<'_>),
    {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| {
            log::warn!("Cycle cache lock was poisoned, recovering");
            poisoned.into_inner()
        });
        entries.clear();
        let tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        populate(&mut CycleEntries { entries: &mut entries });
        tick
    }

    /// Clear the cache without starting a new tick
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Read a value if it has been computed this tick
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let slot = self.lookup(key)?;
        let value = slot.get()?;
        value.downcast_ref::<T>().cloned()
    }

    /// Return this tick's value for `key`, computing it if nobody has yet
    ///
    /// Concurrent callers with the same key observe the same value and
    /// `compute` runs at most once per key per tick; late callers block until
    /// the first caller's computation finishes. Different keys never block each
    /// other during computation.
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        // Unlocked query first, then lock and re-check before inserting
        let slot = match self.lookup(key) {
            Some(slot) => slot,
            None => {
                let mut entries = self
                    .entries
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                Arc::clone(entries.entry(key.to_string()).or_default())
            }
        };

        let mut compute = Some(compute);
        let value = slot.get_or_init(|| {
            let compute = compute.take().expect("initializer runs once");
            Arc::new(compute()) as CachedValue
        });

        match value.downcast_ref::<T>() {
            Some(v) => v.clone(),
            None => {
                // Someone stored a different type under this key; never hand
                // out a wrong value, compute locally instead.
                log::warn!(
                    "Cycle cache key '{}' holds a different type than {}",
                    key,
                    std::any::type_name::<T>()
                );
                match compute.take() {
                    Some(compute) => compute(),
                    None => unreachable!("initializer consumed compute but stored another type"),
                }
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).map_or(false, |slot| slot.get().is_some())
    }

    /// Keys with a computed value this tick
    pub fn keys(&self) -> Vec<String> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<Slot> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).cloned()
    }
}

impl Default for CycleCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Write access to the cache while a tick is being rebuilt
pub struct CycleEntries<'a> {
    entries: &'a mut HashMap<String, Slot>,
}

impl CycleEntries<'_> {
    /// Store a value for the current tick, replacing any earlier one
    pub fn insert<T>(&mut self, key: &str, value: T)
    where
        T: Send + Sync + 'static,
    {
        let cell = OnceCell::new();
        let _ = cell.set(Arc::new(value) as CachedValue);
        self.entries.insert(key.to_string(), Arc::new(cell));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Eagerly fills cache keys at the start of every tick
///
/// Primers are owned and driven by the scheduler thread only, so they may keep
/// mutable probing state (e.g. a `sysinfo::System`) between ticks.
pub trait CachePrimer: Send {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Insert this primer's keys for the new tick
    fn prime(&mut self, entries: &mut CycleEntries<'_>);
}
