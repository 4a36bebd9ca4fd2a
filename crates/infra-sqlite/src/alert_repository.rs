// SQLite AlertSink Implementation

use async_trait::async_trait;
use dvbprobe_core::domain::{Alert, NewAlert};
use dvbprobe_core::error::Result;
use dvbprobe_core::port::{AlertSink, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

use crate::error::map_sqlx_error;

pub struct SqliteAlertSink {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteAlertSink {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Unacknowledged alerts, newest first
    pub async fn list_unacknowledged(&self, limit: i64) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, type, probe_id, severity, message, data, timestamp, acknowledged
            FROM alerts
            WHERE acknowledged = 0
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// Returns false when no such alert exists
    pub async fn acknowledge(&self, alert_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE alerts SET acknowledged = 1 WHERE id = ?")
            .bind(alert_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AlertSink for SqliteAlertSink {
    async fn raise(&self, alert: NewAlert) -> Result<()> {
        warn!(
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            probe_id = ?alert.probe_id,
            message = %alert.message,
            "Alert raised"
        );

        sqlx::query(
            r#"
            INSERT INTO alerts (type, probe_id, severity, message, data, timestamp, acknowledged)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(alert.alert_type.as_str())
        .bind(alert.probe_id)
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(alert.data.map(|d| d.to_string()))
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: i64,
    #[sqlx(rename = "type")]
    alert_type: String,
    probe_id: Option<i64>,
    severity: String,
    message: String,
    data: Option<String>,
    timestamp: i64,
    acknowledged: bool,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert> {
        Ok(Alert {
            id: self.id,
            alert_type: self.alert_type.parse()?,
            probe_id: self.probe_id,
            severity: self.severity.parse()?,
            message: self.message,
            data: self.data.and_then(|d| serde_json::from_str(&d).ok()),
            timestamp: self.timestamp,
            acknowledged: self.acknowledged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;
    use dvbprobe_core::domain::{AlertSeverity, AlertType};
    use dvbprobe_core::port::time_provider::mocks::FixedTimeProvider;

    #[tokio::test]
    async fn test_raise_list_acknowledge() {
        let (_dir, pool) = setup_test_db().await;
        let sink = SqliteAlertSink::new(pool, Arc::new(FixedTimeProvider::new(7_000)));

        // Alerts without a probe are allowed (system-level)
        sink.raise(NewAlert {
            alert_type: AlertType::SystemResource,
            probe_id: None,
            severity: AlertSeverity::Medium,
            message: "memory pressure".to_string(),
            data: Some(serde_json::json!({"memory_percent": 93.5})),
        })
        .await
        .unwrap();

        let alerts = sink.list_unacknowledged(10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.alert_type, AlertType::SystemResource);
        assert_eq!(alert.severity, AlertSeverity::Medium);
        assert_eq!(alert.timestamp, 7_000);
        assert!(!alert.acknowledged);

        assert!(sink.acknowledge(alert.id).await.unwrap());
        assert!(sink.list_unacknowledged(10).await.unwrap().is_empty());
        assert!(!sink.acknowledge(999).await.unwrap());
    }
}
