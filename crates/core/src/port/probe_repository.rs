// Probe Repository Port (persistence collaborator)

use crate::domain::{
    AnalysisRecord, LogEntry, LogLevel, Probe, ProbeId, Stream, StreamId, StatusUpdate,
};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence interface consumed by the supervisor, watchdog and services
///
/// Storage of probes and streams is owned by the implementation; the core
/// only reads them and requests status writes and appends.
#[async_trait]
pub trait ProbeRepository: Send + Sync {
    /// Find probe by ID
    async fn find_probe(&self, id: ProbeId) -> Result<Option<Probe>>;

    /// Find stream by ID
    async fn find_stream(&self, id: StreamId) -> Result<Option<Stream>>;

    /// Apply a status write; returns the updated probe, `None` if unknown
    async fn update_probe_status(&self, id: ProbeId, update: StatusUpdate)
        -> Result<Option<Probe>>;

    /// Append a lifecycle log entry
    async fn append_log(
        &self,
        probe_id: ProbeId,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Append a decoded analysis record
    async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()>;

    /// All probes whose persisted status is `running`
    async fn list_running_probes(&self) -> Result<Vec<Probe>>;

    /// All probes
    async fn list_probes(&self) -> Result<Vec<Probe>>;

    /// Most recent log entries for a probe, newest first
    async fn logs_for(&self, probe_id: ProbeId, limit: i64) -> Result<Vec<LogEntry>>;

    /// Most recent analyses for a probe, newest first
    async fn analyses_for(&self, probe_id: ProbeId, limit: i64) -> Result<Vec<AnalysisRecord>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory repository for core tests
    #[derive(Default)]
    pub struct InMemoryProbeRepository {
        probes: Mutex<HashMap<ProbeId, Probe>>,
        streams: Mutex<HashMap<StreamId, Stream>>,
        logs: Mutex<Vec<LogEntry>>,
        analyses: Mutex<Vec<AnalysisRecord>>,
        status_writes: Mutex<usize>,
        fail_status_writes: Mutex<bool>,
    }

    impl InMemoryProbeRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_probe(&self, probe: Probe) {
            self.probes.lock().unwrap().insert(probe.id, probe);
        }

        pub fn put_stream(&self, stream: Stream) {
            self.streams.lock().unwrap().insert(stream.id, stream);
        }

        pub fn probe(&self, id: ProbeId) -> Option<Probe> {
            self.probes.lock().unwrap().get(&id).cloned()
        }

        pub fn logs(&self) -> Vec<LogEntry> {
            self.logs.lock().unwrap().clone()
        }

        pub fn analyses(&self) -> Vec<AnalysisRecord> {
            self.analyses.lock().unwrap().clone()
        }

        /// Make `update_probe_status` fail with a database error
        pub fn fail_status_writes(&self, fail: bool) {
            *self.fail_status_writes.lock().unwrap() = fail;
        }

        /// Number of `update_probe_status` calls that hit a known probe
        pub fn status_write_count(&self) -> usize {
            *self.status_writes.lock().unwrap()
        }
    }

    #[async_trait]
    impl ProbeRepository for InMemoryProbeRepository {
        async fn find_probe(&self, id: ProbeId) -> Result<Option<Probe>> {
            Ok(self.probe(id))
        }

        async fn find_stream(&self, id: StreamId) -> Result<Option<Stream>> {
            Ok(self.streams.lock().unwrap().get(&id).cloned())
        }

        async fn update_probe_status(
            &self,
            id: ProbeId,
            update: StatusUpdate,
        ) -> Result<Option<Probe>> {
            if *self.fail_status_writes.lock().unwrap() {
                return Err(AppError::Database("database is locked".to_string()));
            }
            let mut probes = self.probes.lock().unwrap();
            match probes.get_mut(&id) {
                Some(probe) => {
                    update.apply_to(probe);
                    *self.status_writes.lock().unwrap() += 1;
                    Ok(Some(probe.clone()))
                }
                None => Ok(None),
            }
        }

        async fn append_log(
            &self,
            probe_id: ProbeId,
            level: LogLevel,
            message: &str,
            data: Option<serde_json::Value>,
        ) -> Result<()> {
            self.logs.lock().unwrap().push(LogEntry {
                probe_id,
                level,
                message: message.to_string(),
                data,
                timestamp: 0,
            });
            Ok(())
        }

        async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
            self.analyses.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn list_running_probes(&self) -> Result<Vec<Probe>> {
            let mut running: Vec<Probe> = self
                .probes
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.is_running())
                .cloned()
                .collect();
            running.sort_by_key(|p| p.id);
            Ok(running)
        }

        async fn list_probes(&self) -> Result<Vec<Probe>> {
            let mut all: Vec<Probe> = self.probes.lock().unwrap().values().cloned().collect();
            all.sort_by_key(|p| p.id);
            Ok(all)
        }

        async fn logs_for(&self, probe_id: ProbeId, limit: i64) -> Result<Vec<LogEntry>> {
            Ok(self
                .logs
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|l| l.probe_id == probe_id)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }

        async fn analyses_for(
            &self,
            probe_id: ProbeId,
            limit: i64,
        ) -> Result<Vec<AnalysisRecord>> {
            Ok(self
                .analyses
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|a| a.probe_id == probe_id)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }
    }
}
