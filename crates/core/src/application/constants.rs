// Supervision constants (no magic values)
use std::time::Duration;

/// Graceful stop deadline before SIGKILL (5 seconds)
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default watchdog period (30 seconds)
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// Default host health check period (1 minute)
pub const DEFAULT_HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default retention pass period (1 hour)
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Capacity of the per-process output channel feeding the decode pipeline
pub const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// Bytes read from a child pipe per chunk
pub const OUTPUT_READ_CHUNK_SIZE: usize = 8192;

/// Stderr bytes retained for the exit report
pub const STDERR_TAIL_LIMIT: usize = 4096;

/// Memory usage (percent) above which the host is reported degraded
pub const MEMORY_DEGRADED_THRESHOLD: f64 = 90.0;

/// Error recorded when the watchdog finds a dead process
pub const UNEXPECTED_STOP_MESSAGE: &str = "process stopped unexpectedly";

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// How long pipes may stay open after the analyzer exits (inherited by a
/// grandchild) before the run is closed anyway
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Stdout bytes buffered without a newline before they are decoded as-is
pub const MAX_PENDING_STDOUT: usize = 1024 * 1024;
