// Health Service - probe counts and host resource snapshot
use crate::application::constants::MEMORY_DEGRADED_THRESHOLD;
use crate::application::shutdown::ShutdownToken;
use crate::domain::ProbeStatus;
use crate::error::Result;
use crate::port::{HostMetrics, ProbeRepository, SystemProbe};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Probe counts by persisted status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeCounts {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub error: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub probes: ProbeCounts,
    pub host: HostMetrics,
}

pub struct HealthService {
    probe_repo: Arc<dyn ProbeRepository>,
    system_probe: Arc<dyn SystemProbe>,
}

impl HealthService {
    pub fn new(probe_repo: Arc<dyn ProbeRepository>, system_probe: Arc<dyn SystemProbe>) -> Self {
        Self {
            probe_repo,
            system_probe,
        }
    }

    /// Degraded when host memory usage reaches the threshold
    pub async fn system_health(&self) -> Result<SystemHealth> {
        let probes = self.probe_repo.list_probes().await?;

        let mut counts = ProbeCounts {
            total: probes.len(),
            ..ProbeCounts::default()
        };
        for probe in &probes {
            match probe.status {
                ProbeStatus::Running => counts.running += 1,
                ProbeStatus::Stopped => counts.stopped += 1,
                ProbeStatus::Error => counts.error += 1,
                ProbeStatus::Paused => {}
            }
        }

        let host = self.system_probe.get_metrics().await;
        let status = if host.memory_percent() >= MEMORY_DEGRADED_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Ok(SystemHealth {
            status,
            probes: counts,
            host,
        })
    }

    /// Periodic health check loop
    pub async fn run(&self, period: Duration, mut shutdown: ShutdownToken) {
        info!(period_secs = period.as_secs(), "Health check started");

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => self.check_once().await,
                _ = shutdown.wait() => {
                    info!("Health check shutting down");
                    break;
                }
            }
        }
    }

    async fn check_once(&self) {
        match self.system_health().await {
            Ok(health) if health.status == HealthStatus::Degraded => {
                warn!(
                    memory_percent = health.host.memory_percent(),
                    running = health.probes.running,
                    "System health degraded"
                );
            }
            Ok(health) => {
                debug!(
                    memory_percent = health.host.memory_percent(),
                    cpu = health.host.cpu_usage_percent,
                    running = health.probes.running,
                    "System healthy"
                );
            }
            Err(e) => error!(error = ?e, "Health check failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Probe;
    use crate::port::probe_repository::mocks::InMemoryProbeRepository;
    use crate::port::system_probe::mocks::MockSystemProbe;

    fn probe_with(id: i64, status: ProbeStatus) -> Probe {
        let mut probe = Probe::new(id, format!("p{}", id), 1, "basic");
        probe.status = status;
        probe
    }

    #[tokio::test]
    async fn test_counts_by_status() {
        let repo = Arc::new(InMemoryProbeRepository::new());
        repo.put_probe(probe_with(1, ProbeStatus::Running));
        repo.put_probe(probe_with(2, ProbeStatus::Running));
        repo.put_probe(probe_with(3, ProbeStatus::Error));
        repo.put_probe(probe_with(4, ProbeStatus::Stopped));
        let service = HealthService::new(repo, Arc::new(MockSystemProbe::new(1024, 8192)));

        let health = service.system_health().await.unwrap();

        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(
            health.probes,
            ProbeCounts {
                total: 4,
                running: 2,
                stopped: 1,
                error: 1
            }
        );
    }

    #[tokio::test]
    async fn test_degraded_at_memory_threshold() {
        let system = Arc::new(MockSystemProbe::new(8000, 10000));
        let service = HealthService::new(Arc::new(InMemoryProbeRepository::new()), system.clone());

        assert_eq!(
            service.system_health().await.unwrap().status,
            HealthStatus::Healthy
        );

        system.set_memory_used(9000);
        assert_eq!(
            service.system_health().await.unwrap().status,
            HealthStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_serializes_lowercase_status() {
        let service = HealthService::new(
            Arc::new(InMemoryProbeRepository::new()),
            Arc::new(MockSystemProbe::new(1, 2)),
        );
        let json = serde_json::to_value(service.system_health().await.unwrap()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["probes"]["total"], 0);
    }
}
