//! Error types for the update engine

/// Errors from the worker pool
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// `submit` was called after `shutdown` began. Callers drop the task.
    #[error("worker pool is shutting down")]
    ShuttingDown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors that stop the engine from running at all
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn scheduler thread: {0}")]
    SchedulerSpawn(#[source] std::io::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
