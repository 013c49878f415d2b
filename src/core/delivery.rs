//! Hands fetch results from worker threads to the presentation context
//!
//! Workers only ever hold a [`DeliverySender`]. Results are queued and the
//! `on_update` callback runs on whichever single thread drives
//! [`Delivery`], never on a worker.

use super::panel_table::PanelTable;
use pulsedeck_types::PanelId;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// Outcome of one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub panel_id: PanelId,
    /// Registration the fetch was dispatched for
    pub generation: u64,
    /// Scheduler tick that dispatched the fetch
    pub tick: u64,
    /// `None` when the source had no data, failed, or panicked
    pub value: Option<Value>,
}

/// Worker-side end of the delivery queue
#[derive(Clone)]
pub struct DeliverySender {
    tx: UnboundedSender<FetchResult>,
}

impl DeliverySender {
    pub fn send(&self, result: FetchResult) {
        if self.tx.send(result).is_err() {
            log::trace!("Delivery closed, dropping result");
        }
    }
}

/// Presentation-side end of the delivery queue
pub struct Delivery {
    rx: UnboundedReceiver<FetchResult>,
    panels: Arc<PanelTable>,
    delivered: u64,
    dropped: u64,
}

impl Delivery {
    pub(crate) fn channel(panels: Arc<PanelTable>) -> (DeliverySender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            DeliverySender { tx },
            Self {
                rx,
                panels,
                delivered: 0,
                dropped: 0,
            },
        )
    }

    /// Deliver everything queued right now without blocking
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch_pending<F>(&mut self, mut on_update: F) -> usize
    where
        F: FnMut(&PanelId, Option<&Value>),
    {
        let mut count = 0;
        loop {
            match self.rx.try_recv() {
                Ok(result) => {
                    if self.deliver(result, &mut on_update) {
                        count += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        count
    }

    /// Deliver results as they arrive
    ///
    /// The `UpdateManager` holds a sender for its whole lifetime, so this only
    /// returns once the manager has been dropped. Hosts that stop earlier
    /// race it against their own shutdown signal (see `tokio::select!`).
    pub async fn run<F>(mut self, mut on_update: F)
    where
        F: FnMut(&PanelId, Option<&Value>),
    {
        while let Some(result) = self.rx.recv().await {
            self.deliver(result, &mut on_update);
        }
        log::debug!(
            "Delivery finished: {} delivered, {} dropped",
            self.delivered,
            self.dropped
        );
    }

    /// Results delivered so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Results dropped because their panel was unregistered
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn deliver<F>(&mut self, result: FetchResult, on_update: &mut F) -> bool
    where
        F: FnMut(&PanelId, Option<&Value>),
    {
        if !self.panels.is_current(&result.panel_id, result.generation) {
            log::trace!(
                "Dropping result for unregistered panel {} (generation {})",
                result.panel_id,
                result.generation
            );
            self.dropped += 1;
            return false;
        }
        on_update(&result.panel_id, result.value.as_ref());
        self.delivered += 1;
        true
    }
}
