//! Shared constants for the engine

use std::time::Duration;

/// Scheduler tick period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Extra worker threads on top of the core count; fetches are I/O bound
pub const WORKER_HEADROOM: usize = 4;

/// Minimum number of cores assumed when sizing the worker pool
pub const MIN_WORKER_CORES: usize = 2;

/// How long `stop()` waits for in-flight fetches and the scheduler thread
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for external sensor commands
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period between SIGTERM and SIGKILL for timed-out commands
pub const COMMAND_TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Default location of DRM devices
pub const DEFAULT_DRM_ROOT: &str = "/sys/class/drm";

/// Default location of hwmon devices
pub const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";

/// Well-known cycle cache keys populated eagerly at the start of every tick
pub mod cache_keys {
    /// `pulsedeck_types::CpuLoad`
    pub const CPU_LOAD: &str = "cpu_load";
    /// `pulsedeck_types::MemorySnapshot`
    pub const MEMORY: &str = "memory";
    /// `Vec<pulsedeck_types::TemperatureReading>`
    pub const TEMPERATURES: &str = "temperatures";
    /// `Vec<pulsedeck_types::FanReading>`, computed lazily
    pub const FANS: &str = "fans";
}
