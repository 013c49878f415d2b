//! Scheduling, worker pool and result delivery

mod delivery;
mod panel_table;
mod update_manager;
mod worker_pool;

#[cfg(test)]
pub(crate) mod test_support;

pub use delivery::{Delivery, DeliverySender, FetchResult};
pub use panel_table::PanelTable;
pub use update_manager::{OverlapPolicy, TickReport, UpdateManager};
pub use worker_pool::{TaskHandle, WorkerPool};
