// Host resource monitoring port
use async_trait::async_trait;
use serde::Serialize;

/// Host resource metrics
#[derive(Debug, Clone, Serialize)]
pub struct HostMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub load_average: [f64; 3],
    pub uptime_secs: u64,
}

impl HostMetrics {
    pub fn memory_percent(&self) -> f64 {
        if self.memory_total_mb == 0 {
            return 0.0;
        }
        self.memory_used_mb as f64 / self.memory_total_mb as f64 * 100.0
    }
}

/// System probe port for host health checks
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Get current host metrics
    ///
    /// # Example
    /// ```text
    /// let metrics = probe.get_metrics().await;
    /// if metrics.memory_percent() > 90.0 {
    ///     println!("memory pressure");
    /// }
    /// ```
    async fn get_metrics(&self) -> HostMetrics;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    /// Mock SystemProbe for testing
    pub struct MockSystemProbe {
        metrics: Arc<Mutex<HostMetrics>>,
    }
    impl MockSystemProbe {
        pub fn new(memory_used_mb: u64, memory_total_mb: u64) -> Self {
            Self {
                metrics: Arc::new(Mutex::new(HostMetrics {
                    cpu_usage_percent: 10.0,
                    memory_used_mb,
                    memory_total_mb,
                    load_average: [0.5, 0.4, 0.3],
                    uptime_secs: 3600,
                })),
            }
        }
        pub fn set_memory_used(&self, memory_used_mb: u64) {
            self.metrics.lock().unwrap().memory_used_mb = memory_used_mb;
        }
    }
    #[async_trait]
    impl SystemProbe for MockSystemProbe {
        async fn get_metrics(&self) -> HostMetrics {
            self.metrics.lock().unwrap().clone()
        }
    }
}
