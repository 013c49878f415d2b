//! Update manager for scheduling and coordinating panel fetches
//!
//! One scheduler thread runs a fixed tick loop. Each tick rebuilds the cycle
//! cache, refreshes the GPU aggregator, picks the panels whose interval has
//! elapsed and hands their fetches to the worker pool. Results travel back
//! through [`Delivery`].

use super::delivery::{Delivery, DeliverySender, FetchResult};
use super::panel_table::PanelTable;
use super::worker_pool::{panic_message, WorkerPool};
use crate::config::EngineSettings;
use crate::error::EngineError;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use pulsedeck_core::{
    CachePrimer, CycleCache, DataSource, FetchContext, GpuAggregator, SharedDataSource,
};
use pulsedeck_types::PanelId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What to do with a due panel whose previous fetch is still running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Wait for the running fetch; the panel fires on the first tick after
    /// it completes
    #[default]
    Skip,
    /// Dispatch anyway; several fetches of one panel may run at once
    Allow,
}

/// Counters for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Panels whose interval had elapsed
    pub due: usize,
    pub dispatched: usize,
    /// Due but still busy with the previous fetch (skip policy)
    pub skipped_in_flight: usize,
    /// Refused by a pool that is shutting down
    pub rejected: usize,
    /// Registered with an unusable interval
    pub disabled: usize,
}

/// A fetch selected for dispatch this tick
struct DueFetch {
    panel_id: PanelId,
    generation: u64,
    source: SharedDataSource,
    in_flight: Arc<AtomicBool>,
}

/// State shared by the manager and its scheduler thread
struct Engine {
    panels: Arc<PanelTable>,
    cache: Arc<CycleCache>,
    gpus: Arc<GpuAggregator>,
    primers: Mutex<Vec<Box<dyn CachePrimer>>>,
    delivery: DeliverySender,
    overlap: OverlapPolicy,
}

impl Engine {
    fn tick(&self, now: Instant, pool: &WorkerPool) -> TickReport {
        // Cache first: every fetch of this tick must see the new snapshot
        let tick = self.refresh_cache();
        self.refresh_gpus();

        let mut report = TickReport {
            tick,
            ..Default::default()
        };
        for fetch in self.collect_due(now, &mut report) {
            self.dispatch(fetch, tick, pool, &mut report);
        }
        report
    }

    fn refresh_cache(&self) -> u64 {
        let mut primers = self.primers.lock().unwrap_or_else(|p| p.into_inner());
        self.cache.rebuild(|entries| {
            for primer in primers.iter_mut() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| primer.prime(entries)));
                if let Err(panic) = result {
                    log::error!(
                        "Cache primer '{}' panicked: {}",
                        primer.name(),
                        panic_message(panic.as_ref())
                    );
                }
            }
        })
    }

    fn refresh_gpus(&self) {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| self.gpus.update())) {
            log::error!("GPU update panicked: {}", panic_message(panic.as_ref()));
        }
    }

    /// Select due panels and stamp `last_fetch_at` before anything is
    /// dispatched. The table lock is never held across a fetch.
    fn collect_due(&self, now: Instant, report: &mut TickReport) -> Vec<DueFetch> {
        let mut panels = self.panels.lock();
        let mut due = Vec::new();

        for (panel_id, entry) in panels.iter_mut() {
            if entry.interval.is_none() {
                report.disabled += 1;
                continue;
            }
            if !entry.is_due(now) {
                continue;
            }
            report.due += 1;

            if self.overlap == OverlapPolicy::Skip && entry.in_flight.load(Ordering::Acquire) {
                log::trace!("Panel {} still fetching, skipping", panel_id);
                report.skipped_in_flight += 1;
                continue;
            }

            entry.last_fetch_at = Some(now);
            entry.in_flight.store(true, Ordering::Release);
            due.push(DueFetch {
                panel_id: panel_id.clone(),
                generation: entry.generation,
                source: Arc::clone(&entry.source),
                in_flight: Arc::clone(&entry.in_flight),
            });
        }
        due
    }

    fn dispatch(&self, fetch: DueFetch, tick: u64, pool: &WorkerPool, report: &mut TickReport) {
        let DueFetch {
            panel_id,
            generation,
            source,
            in_flight,
        } = fetch;
        let ctx = FetchContext::new(Arc::clone(&self.cache), Arc::clone(&self.gpus));
        let delivery = self.delivery.clone();
        let task_in_flight = Arc::clone(&in_flight);
        let task_panel_id = panel_id.clone();

        let submitted = pool.submit(move || {
            let value = run_fetch(&task_panel_id, source.as_ref(), &ctx);
            task_in_flight.store(false, Ordering::Release);
            delivery.send(FetchResult {
                panel_id: task_panel_id,
                generation,
                tick,
                value,
            });
        });

        match submitted {
            Ok(_) => report.dispatched += 1,
            Err(e) => {
                log::debug!("Dropping dispatch for panel {}: {}", panel_id, e);
                in_flight.store(false, Ordering::Release);
                report.rejected += 1;
            }
        }
    }
}

/// Run one fetch, turning errors and panics into an absent value
fn run_fetch(panel_id: &PanelId, source: &dyn DataSource, ctx: &FetchContext) -> Option<Value> {
    match panic::catch_unwind(AssertUnwindSafe(|| source.fetch(ctx))) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            log::warn!("Fetch failed for panel {}: {:#}", panel_id, e);
            None
        }
        Err(panic) => {
            log::error!(
                "Fetch panicked for panel {}: {}",
                panel_id,
                panic_message(panic.as_ref())
            );
            None
        }
    }
}

fn scheduler_loop(
    engine: Arc<Engine>,
    pool: Arc<WorkerPool>,
    tick_interval: Duration,
    stop_rx: Receiver<()>,
) {
    log::info!("Scheduler started (tick {:?}, {} workers)", tick_interval, pool.size());
    loop {
        let started = Instant::now();
        let report = engine.tick(started, &pool);
        log::trace!(
            "Tick {}: {} due, {} dispatched, {} skipped in flight, {} rejected, took {:?}",
            report.tick,
            report.due,
            report.dispatched,
            report.skipped_in_flight,
            report.rejected,
            started.elapsed()
        );

        match stop_rx.recv_timeout(tick_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::info!("Scheduler stopped");
}

/// Join `handle` unless it is still running at `deadline`
fn join_until(handle: JoinHandle<()>, deadline: Instant) -> bool {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            log::warn!("Scheduler thread did not exit in time, detaching it");
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        log::error!("Scheduler thread panicked");
    }
    true
}

struct Running {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
    pool: Arc<WorkerPool>,
}

/// Schedules panel fetches and owns the engine lifecycle
///
/// `start` and `stop` may be called repeatedly; registrations survive a
/// restart. Each `start` gets a fresh worker pool.
pub struct UpdateManager {
    engine: Arc<Engine>,
    settings: EngineSettings,
    running: Mutex<Option<Running>>,
}

impl UpdateManager {
    /// Create a manager and the delivery end for the presentation context
    pub fn new(settings: EngineSettings, gpus: Arc<GpuAggregator>) -> (Self, Delivery) {
        let panels = Arc::new(PanelTable::new());
        let (sender, delivery) = Delivery::channel(Arc::clone(&panels));
        let engine = Engine {
            panels,
            cache: Arc::new(CycleCache::new()),
            gpus,
            primers: Mutex::new(Vec::new()),
            delivery: sender,
            overlap: settings.overlap_policy,
        };

        let manager = Self {
            engine: Arc::new(engine),
            settings,
            running: Mutex::new(None),
        };
        (manager, delivery)
    }

    /// Add a primer that fills cache keys at the start of every tick
    pub fn add_primer(&self, primer: Box<dyn CachePrimer>) {
        log::debug!("Added cache primer '{}'", primer.name());
        self.engine
            .primers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(primer);
    }

    /// Register a panel; it is fetched on the first tick after this call.
    /// Returns the registration generation.
    pub fn register(&self, panel_id: PanelId, source: SharedDataSource) -> u64 {
        self.engine.panels.register(panel_id, source)
    }

    /// Remove a panel. A fetch already running for it completes, but its
    /// result is not delivered.
    ///
    /// Call this on the thread that drives [`Delivery`]. From any other
    /// thread one callback for the panel may still run after this returns.
    pub fn unregister(&self, panel_id: &PanelId) -> bool {
        self.engine.panels.unregister(panel_id)
    }

    pub fn is_registered(&self, panel_id: &PanelId) -> bool {
        self.engine.panels.contains(panel_id)
    }

    pub fn panel_ids(&self) -> Vec<PanelId> {
        self.engine.panels.ids()
    }

    pub fn cache(&self) -> &Arc<CycleCache> {
        &self.engine.cache
    }

    pub fn gpus(&self) -> &Arc<GpuAggregator> {
        &self.engine.gpus
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Run one tick body against `pool` at time `now`
    ///
    /// The scheduler thread calls this in its loop; it is public so a host
    /// can drive ticks itself.
    pub fn run_tick(&self, now: Instant, pool: &WorkerPool) -> TickReport {
        self.engine.tick(now, pool)
    }

    /// Spawn the scheduler thread. No-op if already running.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.is_some() {
            log::debug!("Update manager already running");
            return Ok(());
        }

        let pool = Arc::new(WorkerPool::new(WorkerPool::default_size(
            self.settings.worker_headroom,
        ))?);
        let (stop_tx, stop_rx) = channel::bounded(1);

        let engine = Arc::clone(&self.engine);
        let thread_pool = Arc::clone(&pool);
        let tick_interval = self.settings.tick_interval();
        let spawned = thread::Builder::new()
            .name("pulsedeck-scheduler".to_string())
            .spawn(move || scheduler_loop(engine, thread_pool, tick_interval, stop_rx));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                pool.shutdown(self.settings.shutdown_timeout());
                return Err(EngineError::SchedulerSpawn(e));
            }
        };

        *running = Some(Running {
            stop_tx,
            thread,
            pool,
        });
        Ok(())
    }

    /// Stop the scheduler, drain the worker pool and join the scheduler
    /// thread, all within the configured shutdown timeout
    ///
    /// Returns `true` if everything finished in time. No-op when stopped.
    pub fn stop(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(running) = running else {
            return true;
        };

        let timeout = self.settings.shutdown_timeout();
        let deadline = Instant::now() + timeout;
        log::info!("Stopping update manager");

        let _ = running.stop_tx.send(());
        let joined = join_until(running.thread, deadline);
        let drained = running
            .pool
            .shutdown(deadline.saturating_duration_since(Instant::now()));

        if !(joined && drained) {
            log::warn!("Update manager did not stop cleanly within {:?}", timeout);
        }
        joined && drained
    }
}

impl Drop for UpdateManager {
    fn drop(&mut self) {
        self.stop();
    }
}
