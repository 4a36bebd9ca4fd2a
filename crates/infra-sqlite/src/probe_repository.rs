// SQLite ProbeRepository Implementation

use async_trait::async_trait;
use dvbprobe_core::domain::{
    AnalysisRecord, LogEntry, LogLevel, OutputFormat, Probe, ProbeId, Stream, StreamId,
    StatusUpdate, TransportType,
};
use dvbprobe_core::error::{AppError, Result};
use dvbprobe_core::port::{ProbeRepository, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::error::map_sqlx_error;

/// Stream provisioning input
#[derive(Debug, Clone)]
pub struct NewStream {
    pub name: String,
    pub transport: TransportType,
    pub address: Option<String>,
    pub port: u16,
    pub options: serde_json::Value,
}

/// Probe provisioning input
#[derive(Debug, Clone)]
pub struct NewProbe {
    pub name: String,
    pub stream_id: StreamId,
    pub profile: String,
    pub output_format: Option<OutputFormat>,
    pub options: Vec<String>,
}

pub struct SqliteProbeRepository {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteProbeRepository {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    pub async fn create_stream(&self, stream: NewStream) -> Result<Stream> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO streams (name, type, address, port, options, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&stream.name)
        .bind(stream.transport.as_str())
        .bind(&stream.address)
        .bind(i64::from(stream.port))
        .bind(stream.options.to_string())
        .bind(self.time_provider.now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Stream {
            id,
            name: stream.name,
            transport: stream.transport,
            address: stream.address,
            port: stream.port,
            options: stream.options,
        })
    }

    pub async fn create_probe(&self, probe: NewProbe) -> Result<Probe> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO probes (name, stream_id, profile, options, output_format, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'stopped', ?)
            RETURNING id
            "#,
        )
        .bind(&probe.name)
        .bind(probe.stream_id)
        .bind(&probe.profile)
        .bind(serde_json::to_string(&probe.options)?)
        .bind(probe.output_format.map(|f| f.as_str()))
        .bind(self.time_provider.now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut created = Probe::new(id, probe.name, probe.stream_id, probe.profile);
        created.output_format = probe.output_format;
        created.options = probe.options;
        Ok(created)
    }
}

#[async_trait]
impl ProbeRepository for SqliteProbeRepository {
    async fn find_probe(&self, id: ProbeId) -> Result<Option<Probe>> {
        let row = sqlx::query_as::<_, ProbeRow>("SELECT * FROM probes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ProbeRow::into_probe).transpose()
    }

    async fn find_stream(&self, id: StreamId) -> Result<Option<Stream>> {
        let row = sqlx::query_as::<_, StreamRow>("SELECT * FROM streams WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(StreamRow::into_stream).transpose()
    }

    async fn update_probe_status(
        &self,
        id: ProbeId,
        update: StatusUpdate,
    ) -> Result<Option<Probe>> {
        // Unset fields keep their stored value; moving to running clears error
        let result = sqlx::query(
            r#"
            UPDATE probes
            SET status = ?,
                error = CASE
                    WHEN ? IS NOT NULL THEN ?
                    WHEN ? = 'running' THEN NULL
                    ELSE error
                END,
                process_id = COALESCE(?, process_id),
                started_at = COALESCE(?, started_at),
                stopped_at = COALESCE(?, stopped_at)
            WHERE id = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.error)
        .bind(&update.error)
        .bind(update.status.as_str())
        .bind(update.process_id.map(i64::from))
        .bind(update.started_at)
        .bind(update.stopped_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_probe(id).await
    }

    async fn append_log(
        &self,
        probe_id: ProbeId,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO probe_logs (probe_id, level, message, data, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(probe_id)
        .bind(level.as_str())
        .bind(message)
        .bind(data.map(|d| d.to_string()))
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        sqlx::query("INSERT INTO analyses (probe_id, stream_id, data, timestamp) VALUES (?, ?, ?, ?)")
            .bind(record.probe_id)
            .bind(record.stream_id)
            .bind(record.payload.to_string())
            .bind(record.timestamp)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_running_probes(&self) -> Result<Vec<Probe>> {
        let rows = sqlx::query_as::<_, ProbeRow>(
            "SELECT * FROM probes WHERE status = 'running' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ProbeRow::into_probe).collect()
    }

    async fn list_probes(&self) -> Result<Vec<Probe>> {
        let rows = sqlx::query_as::<_, ProbeRow>("SELECT * FROM probes ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(ProbeRow::into_probe).collect()
    }

    async fn logs_for(&self, probe_id: ProbeId, limit: i64) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT probe_id, level, message, data, timestamp FROM probe_logs
            WHERE probe_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(probe_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(LogRow::into_entry).collect()
    }

    async fn analyses_for(&self, probe_id: ProbeId, limit: i64) -> Result<Vec<AnalysisRecord>> {
        let rows = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT probe_id, stream_id, data, timestamp FROM analyses
            WHERE probe_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(probe_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(AnalysisRow::into_record).collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct ProbeRow {
    id: i64,
    name: String,
    stream_id: i64,
    profile: String,
    options: String,
    output_format: Option<String>,
    status: String,
    process_id: Option<i64>,
    started_at: Option<i64>,
    stopped_at: Option<i64>,
    error: Option<String>,
}

impl ProbeRow {
    fn into_probe(self) -> Result<Probe> {
        let output_format = self
            .output_format
            .as_deref()
            .map(str::parse::<OutputFormat>)
            .transpose()?;

        // Legacy rows may hold a bare option string instead of a JSON array
        let options: Vec<String> = serde_json::from_str(&self.options).unwrap_or_else(|_| {
            self.options
                .split_whitespace()
                .map(str::to_string)
                .collect()
        });

        Ok(Probe {
            id: self.id,
            name: self.name,
            stream_id: self.stream_id,
            profile: self.profile,
            output_format,
            options,
            status: self.status.parse()?,
            process_id: self.process_id.and_then(|pid| u32::try_from(pid).ok()),
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            error: self.error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StreamRow {
    id: i64,
    name: String,
    #[sqlx(rename = "type")]
    transport: String,
    address: Option<String>,
    port: i64,
    options: String,
}

impl StreamRow {
    fn into_stream(self) -> Result<Stream> {
        let port = u16::try_from(self.port)
            .map_err(|_| AppError::Internal(format!("stream {} has invalid port {}", self.id, self.port)))?;

        Ok(Stream {
            id: self.id,
            name: self.name,
            transport: self.transport.parse()?,
            address: self.address,
            port,
            options: serde_json::from_str(&self.options).unwrap_or(serde_json::json!({})),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    probe_id: i64,
    level: String,
    message: String,
    data: Option<String>,
    timestamp: i64,
}

impl LogRow {
    fn into_entry(self) -> Result<LogEntry> {
        Ok(LogEntry {
            probe_id: self.probe_id,
            level: self.level.parse()?,
            message: self.message,
            data: self.data.and_then(|d| serde_json::from_str(&d).ok()),
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AnalysisRow {
    probe_id: i64,
    stream_id: i64,
    data: String,
    timestamp: i64,
}

impl AnalysisRow {
    fn into_record(self) -> Result<AnalysisRecord> {
        Ok(AnalysisRecord {
            probe_id: self.probe_id,
            stream_id: self.stream_id,
            payload: serde_json::from_str(&self.data)?,
            timestamp: self.timestamp,
        })
    }
}
