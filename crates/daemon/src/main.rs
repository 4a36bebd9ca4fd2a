//! DVB Probe Daemon - Main Entry Point
//! Supervises analyzer processes, reconciles probe status, prunes old data

mod config;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dvbprobe_core::application::{
    shutdown_channel, CommandBuilder, HealthService, ProbeLocks, RetentionScheduler, Watchdog,
};
use dvbprobe_core::domain::ProfileCatalog;
use dvbprobe_core::port::time_provider::SystemTimeProvider;
use dvbprobe_infra_sqlite::{
    create_pool, run_migrations, SqliteAlertSink, SqliteMaintenance, SqliteProbeRepository,
};
use dvbprobe_infra_system::{
    AnalyzerToolchain, ProcessTable, SubprocessSupervisor, SystemProbeImpl,
};

use config::{DaemonConfig, LogFormat};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOG_FILE_PREFIX: &str = "dvbprobe.log";
const LOOP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging; the guard flushes the file writer on exit
    let _log_guard = init_logging(&config);

    info!("DVB probe daemon v{} starting...", VERSION);

    // 3. Initialize database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!(db_path = %config.db_path, "Initializing database...");

    let pool = create_pool(&config.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let probe_repo = Arc::new(SqliteProbeRepository::new(
        pool.clone(),
        time_provider.clone(),
    ));
    let alert_sink = Arc::new(SqliteAlertSink::new(pool.clone(), time_provider.clone()));
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone()));
    let system_probe = Arc::new(SystemProbeImpl::new());

    let locks = Arc::new(ProbeLocks::new());
    let process_table = Arc::new(ProcessTable::new());
    let command_builder = CommandBuilder::new(
        config.invocation.clone(),
        config.default_options.clone(),
        ProfileCatalog::builtin(),
    );
    let supervisor = Arc::new(SubprocessSupervisor::new(
        probe_repo.clone(),
        command_builder,
        process_table,
        locks.clone(),
        time_provider.clone(),
    ));

    // 5. Analyzer availability (probes will fail to start without it)
    let toolchain = AnalyzerToolchain::new(config.invocation.clone());
    if !toolchain.is_available().await {
        warn!(
            program = %config.invocation.program,
            "Analyzer not available; probe starts will fail until it is installed"
        );
    }

    // 6. Start periodic loops
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let watchdog = Watchdog::new(
        probe_repo.clone(),
        supervisor.clone(),
        alert_sink,
        locks,
        time_provider.clone(),
    );
    let watchdog_interval = config.watchdog_interval;
    let watchdog_token = shutdown_rx.clone();
    let watchdog_handle = tokio::spawn(async move {
        watchdog.run(watchdog_interval, watchdog_token).await;
    });

    let health = HealthService::new(probe_repo.clone(), system_probe);
    let health_interval = config.healthcheck_interval;
    let health_token = shutdown_rx.clone();
    let health_handle = tokio::spawn(async move {
        health.run(health_interval, health_token).await;
    });

    let retention = RetentionScheduler::new(
        maintenance,
        time_provider.clone(),
        config.retention.clone(),
        config.cleanup_interval,
    );
    let retention_handle = tokio::spawn(retention.run(shutdown_rx));

    info!("System ready. Supervising probes...");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    wait_for_shutdown_signal().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: loops first so the watchdog does not flag the
    // processes we are about to stop
    shutdown_tx.shutdown();
    for handle in [watchdog_handle, health_handle, retention_handle] {
        if tokio::time::timeout(LOOP_SHUTDOWN_TIMEOUT, handle)
            .await
            .is_err()
        {
            warn!("Background loop did not stop in time");
        }
    }

    let stopped = supervisor.stop_all().await;
    info!(stopped_processes = stopped, "Analyzer processes stopped");

    pool.close().await;
    info!("Shutdown complete.");

    Ok(())
}

fn init_logging(config: &DaemonConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dvbprobe=info"));

    // Optional rolling file output, always JSON
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match config.log_format {
        // Production: JSON structured logging
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }

    guard
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
