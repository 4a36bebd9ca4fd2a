//! Shared wiring for the integration tests
//!
//! Real SQLite in a temp dir, real child processes. The analyzer is
//! replaced by `sh -c <script>`; the generated analyzer arguments land in
//! the script's positional parameters and are ignored.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dvbprobe_core::application::{
    AnalyzerInvocation, CommandBuilder, ProbeLocks, ProbeService, Watchdog,
};
use dvbprobe_core::domain::{OutputFormat, Probe, ProfileCatalog, TransportType};
use dvbprobe_core::port::time_provider::SystemTimeProvider;
use dvbprobe_infra_sqlite::{
    create_pool, run_migrations, NewProbe, NewStream, SqliteAlertSink, SqliteProbeRepository,
};
use dvbprobe_infra_system::{ProcessTable, SubprocessSupervisor};
use tempfile::TempDir;

pub struct Harness {
    _dir: TempDir,
    pub repo: Arc<SqliteProbeRepository>,
    pub alerts: Arc<SqliteAlertSink>,
    pub supervisor: Arc<SubprocessSupervisor>,
    pub service: ProbeService,
    pub watchdog: Watchdog,
}

impl Harness {
    /// Analyzer replaced by `sh -c script`
    pub async fn with_script(script: &str) -> Self {
        Self::with_invocation(AnalyzerInvocation {
            program: "sh".to_string(),
            prefix_args: vec!["-c".to_string(), script.to_string(), "tsp".to_string()],
        })
        .await
    }

    pub async fn with_invocation(invocation: AnalyzerInvocation) -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("probes.db");
        let pool = create_pool(db_path.to_str().unwrap()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let time_provider = Arc::new(SystemTimeProvider);
        let repo = Arc::new(SqliteProbeRepository::new(
            pool.clone(),
            time_provider.clone(),
        ));
        let alerts = Arc::new(SqliteAlertSink::new(pool, time_provider.clone()));
        let locks = Arc::new(ProbeLocks::new());

        let supervisor = Arc::new(SubprocessSupervisor::new(
            repo.clone(),
            CommandBuilder::new(invocation, Vec::new(), ProfileCatalog::empty()),
            Arc::new(ProcessTable::new()),
            locks.clone(),
            time_provider.clone(),
        ));

        let service = ProbeService::new(
            repo.clone(),
            supervisor.clone(),
            locks.clone(),
            time_provider.clone(),
        );
        let watchdog = Watchdog::new(
            repo.clone(),
            supervisor.clone(),
            alerts.clone(),
            locks,
            time_provider,
        );

        Self {
            _dir: dir,
            repo,
            alerts,
            supervisor,
            service,
            watchdog,
        }
    }

    /// Stream plus probe with the given output format
    pub async fn provision(&self, format: OutputFormat) -> Probe {
        let stream = self
            .repo
            .create_stream(NewStream {
                name: "mux-1".to_string(),
                transport: TransportType::Udp,
                address: Some("239.1.1.1".to_string()),
                port: 1234,
                options: serde_json::json!({}),
            })
            .await
            .unwrap();

        self.repo
            .create_probe(NewProbe {
                name: "probe-1".to_string(),
                stream_id: stream.id,
                profile: "basic".to_string(),
                output_format: Some(format),
                options: Vec::new(),
            })
            .await
            .unwrap()
    }
}

/// Poll `check` until it yields a value or the timeout expires
pub async fn eventually<T, F, Fut>(timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
