// Retention Scheduler
// Periodic pruning of old analyses and acknowledged alerts

use crate::application::constants::MILLIS_PER_DAY;
use crate::application::shutdown::ShutdownToken;
use crate::error::Result;
use crate::port::{Maintenance, RetentionConfig, RetentionStats, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Retention scheduler
///
/// Runs the cleanup job in the background; failures are logged and the
/// next tick tries again.
pub struct RetentionScheduler {
    maintenance: Arc<dyn Maintenance>,
    time_provider: Arc<dyn TimeProvider>,
    config: RetentionConfig,
    period: Duration,
}

impl RetentionScheduler {
    /// # Arguments
    /// * `maintenance` - Storage pruning implementation
    /// * `config` - Retention windows
    /// * `period` - How often to run the cleanup job
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        time_provider: Arc<dyn TimeProvider>,
        config: RetentionConfig,
        period: Duration,
    ) -> Self {
        Self {
            maintenance,
            time_provider,
            config,
            period,
        }
    }

    /// Run cleanup loop (background task) until shutdown
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            period_secs = self.period.as_secs(),
            analysis_retention_days = self.config.analysis_retention_days,
            alert_retention_days = self.config.alert_retention_days,
            "Retention scheduler started"
        );

        let mut tick = interval(self.period);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = ?e, "Scheduled cleanup failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Retention scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Run one cleanup pass immediately
    pub async fn run_now(&self) -> Result<RetentionStats> {
        let now = self.time_provider.now_millis();
        let analysis_cutoff = now - self.config.analysis_retention_days * MILLIS_PER_DAY;
        let alert_cutoff = now - self.config.alert_retention_days * MILLIS_PER_DAY;

        let stats = RetentionStats {
            analyses_deleted: self
                .maintenance
                .prune_analyses_before(analysis_cutoff)
                .await?,
            alerts_deleted: self
                .maintenance
                .prune_acknowledged_alerts_before(alert_cutoff)
                .await?,
        };

        info!(
            analyses_deleted = stats.analyses_deleted,
            alerts_deleted = stats.alerts_deleted,
            "Cleanup completed"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::AppError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMaintenance {
        cutoffs: Mutex<Vec<(&'static str, i64)>>,
        fail: bool,
    }

    #[async_trait]
    impl Maintenance for RecordingMaintenance {
        async fn prune_analyses_before(&self, cutoff_millis: i64) -> Result<u64> {
            if self.fail {
                return Err(AppError::Database("locked".to_string()));
            }
            self.cutoffs.lock().unwrap().push(("analyses", cutoff_millis));
            Ok(3)
        }

        async fn prune_acknowledged_alerts_before(&self, cutoff_millis: i64) -> Result<u64> {
            self.cutoffs.lock().unwrap().push(("alerts", cutoff_millis));
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_cutoffs_follow_retention_windows() {
        let maintenance = Arc::new(RecordingMaintenance::default());
        let now = 100 * MILLIS_PER_DAY;
        let scheduler = RetentionScheduler::new(
            maintenance.clone(),
            Arc::new(FixedTimeProvider::new(now)),
            RetentionConfig::default(),
            Duration::from_secs(3600),
        );

        let stats = scheduler.run_now().await.unwrap();

        assert_eq!(
            stats,
            RetentionStats {
                analyses_deleted: 3,
                alerts_deleted: 1
            }
        );
        assert_eq!(
            *maintenance.cutoffs.lock().unwrap(),
            vec![("analyses", 70 * MILLIS_PER_DAY), ("alerts", 93 * MILLIS_PER_DAY)]
        );
    }

    #[tokio::test]
    async fn test_failure_is_returned_from_run_now() {
        let maintenance = Arc::new(RecordingMaintenance {
            fail: true,
            ..Default::default()
        });
        let scheduler = RetentionScheduler::new(
            maintenance,
            Arc::new(FixedTimeProvider::new(0)),
            RetentionConfig::default(),
            Duration::from_secs(3600),
        );

        assert!(scheduler.run_now().await.is_err());
    }

    #[tokio::test]
    async fn test_loop_survives_failures_and_stops_on_shutdown() {
        let maintenance = Arc::new(RecordingMaintenance {
            fail: true,
            ..Default::default()
        });
        let scheduler = RetentionScheduler::new(
            maintenance,
            Arc::new(FixedTimeProvider::new(0)),
            RetentionConfig::default(),
            Duration::from_millis(10),
        );
        let (tx, token) = crate::application::shutdown_channel();

        let handle = tokio::spawn(scheduler.run(token));
        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
