//! Registration table shared by the scheduler and delivery

use pulsedeck_core::SharedDataSource;
use pulsedeck_types::{IntervalSetting, PanelId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// One registered panel
pub(crate) struct PanelEntry {
    pub source: SharedDataSource,
    /// `None` when the configured interval is unusable; never dispatched
    pub interval: Option<Duration>,
    /// `None` until the first dispatch, so a new panel is due immediately
    pub last_fetch_at: Option<Instant>,
    pub generation: u64,
    pub in_flight: Arc<AtomicBool>,
}

impl PanelEntry {
    pub fn is_due(&self, now: Instant) -> bool {
        match (self.interval, self.last_fetch_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(interval), Some(last)) => now.saturating_duration_since(last) >= interval,
        }
    }
}

/// Panels keyed by id, each with a registration generation
///
/// The generation changes every time an id is (re-)registered, which lets
/// delivery tell a result for the current registration apart from a late
/// result for one that has since been removed.
#[derive(Default)]
pub struct PanelTable {
    entries: Mutex<HashMap<PanelId, PanelEntry>>,
    next_generation: AtomicU64,
}

impl PanelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<PanelId, PanelEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            log::warn!("Panel table lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Add a panel. Registering an id that is already present keeps the
    /// existing registration and returns its generation.
    pub fn register(&self, id: PanelId, source: SharedDataSource) -> u64 {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&id) {
            log::debug!("Panel {} already registered", id);
            return existing.generation;
        }

        let interval = match source.update_interval() {
            IntervalSetting::Seconds(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(interval) => Some(interval),
                Err(e) => {
                    log::warn!(
                        "Panel {} update interval {}s is out of range ({}), scheduling disabled",
                        id,
                        secs,
                        e
                    );
                    None
                }
            },
            IntervalSetting::Disabled => {
                log::warn!("Panel {} has an invalid update interval, scheduling disabled", id);
                None
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(
            "Registered panel {} (source {}, interval {:?}, generation {})",
            id,
            source.metadata().id,
            interval,
            generation
        );
        entries.insert(
            id,
            PanelEntry {
                source,
                interval,
                last_fetch_at: None,
                generation,
                in_flight: Arc::new(AtomicBool::new(false)),
            },
        );
        generation
    }

    /// Remove a panel; any result still in flight for it is dropped
    ///
    /// The drop is only strict when called on the delivery thread.
    pub fn unregister(&self, id: &PanelId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            log::debug!("Unregistered panel {}", id);
        }
        removed
    }

    /// Whether `(id, generation)` is the live registration
    pub fn is_current(&self, id: &PanelId, generation: u64) -> bool {
        self.lock()
            .get(id)
            .map_or(false, |entry| entry.generation == generation)
    }

    pub fn contains(&self, id: &PanelId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn generation(&self, id: &PanelId) -> Option<u64> {
        self.lock().get(id).map(|entry| entry.generation)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<PanelId> {
        let mut ids: Vec<PanelId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{Behavior, ScriptedSource};
    use serde_json::json;

    #[test]
    fn test_generations_increase_across_reregistration() {
        let table = PanelTable::new();
        let id = PanelId::new("cpu");
        let first = table.register(id.clone(), ScriptedSource::new("1", Behavior::Value(json!(1))));
        assert!(table.is_current(&id, first));

        assert!(table.unregister(&id));
        assert!(!table.is_current(&id, first));
        assert!(!table.unregister(&id));

        let second = table.register(id.clone(), ScriptedSource::new("1", Behavior::Value(json!(1))));
        assert!(second > first);
        assert_eq!(table.generation(&id), Some(second));
    }

    #[test]
    fn test_invalid_interval_registers_disabled() {
        let table = PanelTable::new();
        for (name, interval) in [("zero", "0"), ("negative", "-1"), ("nan", "NaN"), ("huge", "1e20")] {
            table.register(PanelId::new(name), ScriptedSource::new(interval, Behavior::Value(json!(1))));
        }
        assert_eq!(table.len(), 4);

        let now = Instant::now();
        let entries = table.lock();
        assert!(entries.values().all(|entry| entry.interval.is_none() && !entry.is_due(now)));
    }

    #[test]
    fn test_is_due() {
        let table = PanelTable::new();
        let id = PanelId::new("mem");
        table.register(id.clone(), ScriptedSource::new("0.5", Behavior::Value(json!(1))));

        let now = Instant::now();
        let mut entries = table.lock();
        let entry = entries.get_mut(&id).unwrap();
        assert!(entry.is_due(now));

        entry.last_fetch_at = Some(now);
        assert!(!entry.is_due(now + Duration::from_millis(499)));
        assert!(entry.is_due(now + Duration::from_millis(500)));
    }
}
