// SQLite Maintenance Implementation (retention)
use async_trait::async_trait;
use dvbprobe_core::error::Result;
use dvbprobe_core::port::Maintenance;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::map_sqlx_error;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn prune_analyses_before(&self, cutoff_millis: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM analyses WHERE timestamp < ?")
            .bind(cutoff_millis)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected();
        info!(cutoff = cutoff_millis, deleted = deleted, "Old analyses pruned");
        Ok(deleted)
    }

    async fn prune_acknowledged_alerts_before(&self, cutoff_millis: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM alerts WHERE acknowledged = 1 AND timestamp < ?")
            .bind(cutoff_millis)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected();
        info!(cutoff = cutoff_millis, deleted = deleted, "Acknowledged alerts pruned");
        Ok(deleted)
    }
}
