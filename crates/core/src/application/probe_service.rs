// Probe Service - start/stop/status use cases
use crate::application::probe_locks::ProbeLocks;
use crate::domain::{LogLevel, Probe, ProbeId, ProbeStatus, StatusUpdate};
use crate::error::{AppError, Result};
use crate::port::{ProbeRepository, ProcessError, ProcessRef, ProcessSupervisor, TimeProvider};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of a start request
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(Probe),
    /// Persisted status was already `running`; nothing was spawned
    AlreadyRunning(Probe),
}

impl StartOutcome {
    pub fn probe(&self) -> &Probe {
        match self {
            StartOutcome::Started(p) | StartOutcome::AlreadyRunning(p) => p,
        }
    }
}

/// Status as reported to operators, reconciled with OS liveness
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStatusView {
    pub id: ProbeId,
    pub status: ProbeStatus,
    pub process_id: Option<u32>,
    pub started_at: Option<i64>,
    pub stopped_at: Option<i64>,
    pub error: Option<String>,
}

/// Probe Service
pub struct ProbeService {
    probe_repo: Arc<dyn ProbeRepository>,
    supervisor: Arc<dyn ProcessSupervisor>,
    locks: Arc<ProbeLocks>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ProbeService {
    pub fn new(
        probe_repo: Arc<dyn ProbeRepository>,
        supervisor: Arc<dyn ProcessSupervisor>,
        locks: Arc<ProbeLocks>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            probe_repo,
            supervisor,
            locks,
            time_provider,
        }
    }

    async fn find(&self, probe_id: ProbeId) -> Result<Probe> {
        self.probe_repo
            .find_probe(probe_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Probe {}", probe_id)))
    }

    /// Start the analyzer for a probe
    ///
    /// The per-probe lock is held from the status check until `running` is
    /// persisted, so the exit of a short-lived process is always recorded
    /// after it.
    pub async fn start(&self, probe_id: ProbeId) -> Result<StartOutcome> {
        let _guard = self.locks.lock(probe_id).await;

        let probe = self.find(probe_id).await?;
        if probe.is_running() {
            debug!(probe_id = %probe_id, "Probe already running");
            return Ok(StartOutcome::AlreadyRunning(probe));
        }

        let pid = match self.supervisor.start(&probe).await {
            Ok(pid) => pid,
            Err(e) => return Err(self.record_start_failure(probe_id, e).await),
        };

        let now = self.time_provider.now_millis();
        let updated = match self
            .probe_repo
            .update_probe_status(probe_id, StatusUpdate::running(pid, now))
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.abandon_run(probe_id, pid).await;
                return Err(AppError::NotFound(format!("Probe {}", probe_id)));
            }
            Err(e) => {
                self.abandon_run(probe_id, pid).await;
                return Err(e);
            }
        };

        info!(probe_id = %probe_id, pid = pid, "Probe started");

        Ok(StartOutcome::Started(updated))
    }

    /// A process nobody will ever see as `running` must not outlive start()
    async fn abandon_run(&self, probe_id: ProbeId, pid: u32) {
        error!(probe_id = %probe_id, pid = pid, "Failed to persist running status, stopping process");
        if let Err(e) = self.supervisor.stop(ProcessRef::Probe(probe_id)).await {
            error!(probe_id = %probe_id, pid = pid, error = %e, "Failed to stop unrecorded process");
        }
    }

    async fn record_start_failure(&self, probe_id: ProbeId, e: ProcessError) -> AppError {
        let message = e.to_string();
        error!(probe_id = %probe_id, error = %message, "Failed to start probe");

        if let Err(log_err) = self
            .probe_repo
            .append_log(
                probe_id,
                LogLevel::Error,
                &format!("Failed to start probe: {}", message),
                None,
            )
            .await
        {
            error!(probe_id = %probe_id, error = %log_err, "Failed to append start failure log");
        }

        // Spawn failures are closed out by the supervisor; a live handle
        // means the probe is not actually in error.
        if !matches!(
            e,
            ProcessError::SpawnFailed(_) | ProcessError::AlreadyRunning { .. }
        ) {
            if let Err(write_err) = self
                .probe_repo
                .update_probe_status(probe_id, StatusUpdate::failed_to_start(&message))
                .await
            {
                error!(probe_id = %probe_id, error = %write_err, "Failed to record start failure");
            }
        }

        e.into()
    }

    /// Stop the analyzer for a probe
    ///
    /// Not running, or no handle held by this supervisor: returns the
    /// probe unchanged.
    pub async fn stop(&self, probe_id: ProbeId) -> Result<Probe> {
        let _guard = self.locks.lock(probe_id).await;

        let probe = self.find(probe_id).await?;
        if !probe.is_running() {
            return Ok(probe);
        }

        match self.supervisor.stop(ProcessRef::Probe(probe_id)).await {
            Ok(()) => {}
            Err(ProcessError::NotFound(_)) => {
                debug!(probe_id = %probe_id, "No live handle for probe, nothing to stop");
                return Ok(probe);
            }
            Err(e) => return Err(e.into()),
        }

        let now = self.time_provider.now_millis();
        let updated = self
            .probe_repo
            .update_probe_status(probe_id, StatusUpdate::stopped(now))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Probe {}", probe_id)))?;

        self.probe_repo
            .append_log(probe_id, LogLevel::Info, "Probe stopped", None)
            .await?;

        info!(probe_id = %probe_id, "Probe stopped");

        Ok(updated)
    }

    /// Persisted status reconciled with the live process
    pub async fn status(&self, probe_id: ProbeId) -> Result<ProbeStatusView> {
        let probe = self.find(probe_id).await?;

        let status = match probe.status {
            ProbeStatus::Running => {
                let alive = probe
                    .process_id
                    .map(|pid| self.supervisor.is_running(ProcessRef::Pid(pid)))
                    .unwrap_or(false);
                if alive {
                    ProbeStatus::Running
                } else {
                    ProbeStatus::Stopped
                }
            }
            other => other,
        };

        Ok(ProbeStatusView {
            id: probe.id,
            status,
            process_id: probe.process_id,
            started_at: probe.started_at,
            stopped_at: probe.stopped_at,
            error: probe.error,
        })
    }
}
