// Retention maintenance port
use crate::error::Result;
use async_trait::async_trait;

/// Outcome of one retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub analyses_deleted: u64,
    pub alerts_deleted: u64,
}

/// Retention configuration
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Keep analyses newer than this many days
    pub analysis_retention_days: i64,

    /// Keep acknowledged alerts newer than this many days
    pub alert_retention_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            analysis_retention_days: 30,
            alert_retention_days: 7,
        }
    }
}

/// Storage pruning operations
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Delete analyses with `timestamp < cutoff_millis`
    ///
    /// # Returns
    /// Number of rows deleted
    async fn prune_analyses_before(&self, cutoff_millis: i64) -> Result<u64>;

    /// Delete acknowledged alerts with `timestamp < cutoff_millis`
    ///
    /// Unacknowledged alerts are never pruned.
    async fn prune_acknowledged_alerts_before(&self, cutoff_millis: i64) -> Result<u64>;
}
