//! Bounded thread pool that runs panel fetches off the scheduler thread

use crate::error::PoolError;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use pulsedeck_core::constants::MIN_WORKER_CORES;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Poll period while waiting for workers to finish during shutdown
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Number of queued plus running jobs
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn increment(&self) {
        *self.count.lock().unwrap_or_else(|p| p.into_inner()) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_zero(&self, timeout: Duration) -> bool {
        let count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        let (count, _) = self
            .idle
            .wait_timeout_while(count, timeout, |count| *count > 0)
            .unwrap_or_else(|p| p.into_inner());
        *count == 0
    }
}

/// Handle to one submitted task's return value
pub struct TaskHandle<T> {
    rx: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes. `None` if it panicked or was dropped.
    pub fn wait(self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Like [`wait`](Self::wait) with an upper bound
    pub fn wait_timeout(self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Fixed-size pool of worker threads fed by an unbounded queue
///
/// Concurrency is bounded by the thread count, so a burst of subprocess-based
/// fetches never runs more than `size` external commands at once. A task
/// that panics is contained to that task; the worker keeps running.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
    pending: Arc<Pending>,
    size: usize,
}

impl WorkerPool {
    /// `max(cores, 2) + headroom`; fetches mostly wait on I/O
    pub fn default_size(headroom: usize) -> usize {
        num_cpus::get().max(MIN_WORKER_CORES) + headroom
    }

    /// Spawn `size` worker threads (at least one)
    pub fn new(size: usize) -> Result<Self, PoolError> {
        let size = size.max(1);
        let (sender, receiver) = channel::unbounded::<Job>();
        let pending = Arc::new(Pending::default());

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = receiver.clone();
            let pending = Arc::clone(&pending);
            let spawned = thread::Builder::new()
                .name(format!("pulsedeck-worker-{}", id))
                .spawn(move || worker_loop(receiver, pending));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Let the already spawned workers exit
                    drop(sender);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        log::debug!("Worker pool started with {} threads", size);
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            shutting_down: AtomicBool::new(false),
            pending,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Queue a task. Fails fast once shutdown has begun.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }

        let (tx, rx) = channel::bounded(1);
        let job: Job = Box::new(move || {
            let _ = tx.send(task());
        });

        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        let Some(sender) = sender.as_ref() else {
            return Err(PoolError::ShuttingDown);
        };

        self.pending.increment();
        if sender.send(job).is_err() {
            self.pending.decrement();
            return Err(PoolError::ShuttingDown);
        }
        Ok(TaskHandle { rx })
    }

    /// Wait until no task is queued or running
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pending.wait_zero(timeout)
    }

    /// Tasks queued or running right now
    pub fn pending(&self) -> usize {
        *self.pending.count.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Stop accepting work, let queued and running tasks finish, and join the
    /// workers. Tasks are never cancelled.
    ///
    /// Returns `false` if some workers were still busy at `timeout`; those
    /// threads are detached and finish on their own.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            log::debug!("Worker pool shutdown already in progress");
        }

        // Closing the queue makes each worker exit once it is drained
        drop(self.sender.lock().unwrap_or_else(|p| p.into_inner()).take());

        let mut workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|p| p.into_inner()));
        let deadline = Instant::now() + timeout;

        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                workers.into_iter().partition(|handle| handle.is_finished());
            for handle in finished {
                if handle.join().is_err() {
                    log::warn!("Worker thread panicked outside a task");
                }
            }
            workers = running;

            if workers.is_empty() {
                log::debug!("Worker pool drained");
                return true;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "Worker pool shutdown timed out after {:?}, {} worker(s) still busy ({} task(s) pending)",
                    timeout,
                    workers.len(),
                    self.pending()
                );
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue is enough; workers finish in the background
        self.shutting_down.store(true, Ordering::Release);
        self.sender.get_mut().unwrap_or_else(|p| p.into_inner()).take();
    }
}

fn worker_loop(receiver: Receiver<Job>, pending: Arc<Pending>) {
    while let Ok(job) = receiver.recv() {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
            log::error!("Task panicked in worker pool: {}", panic_message(panic.as_ref()));
        }
        pending.decrement();
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
