// Host metrics implementation
// reason: sysinfo for cross-platform system monitoring
use async_trait::async_trait;
use std::sync::Mutex;
use sysinfo::System;
use tracing::debug;

use dvbprobe_core::port::system_probe::{HostMetrics, SystemProbe};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// System probe implementation using sysinfo
///
/// CPU usage is computed between two refreshes, so the first reading after
/// construction may be 0.
pub struct SystemProbeImpl {
    system: Mutex<System>,
}

impl SystemProbeImpl {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemProbeImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for SystemProbeImpl {
    async fn get_metrics(&self) -> HostMetrics {
        let mut sys = self.system.lock().unwrap_or_else(|e| e.into_inner());

        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu_usage_percent = sys.global_cpu_info().cpu_usage();
        let memory_used_mb = sys.used_memory() / BYTES_PER_MB;
        let memory_total_mb = sys.total_memory() / BYTES_PER_MB;

        let load = System::load_average();
        let uptime_secs = System::uptime();

        debug!(
            cpu = %cpu_usage_percent,
            mem_used_mb = %memory_used_mb,
            mem_total_mb = %memory_total_mb,
            load_1m = %load.one,
            "Host metrics collected"
        );

        HostMetrics {
            cpu_usage_percent,
            memory_used_mb,
            memory_total_mb,
            load_average: [load.one, load.five, load.fifteen],
            uptime_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_metrics() {
        let probe = SystemProbeImpl::new();
        let metrics = probe.get_metrics().await;

        assert!(metrics.cpu_usage_percent >= 0.0);
        assert!(metrics.memory_total_mb > 0);
        assert!(metrics.memory_used_mb <= metrics.memory_total_mb);
        assert!(metrics.memory_percent() <= 100.0);
    }
}
