// Watchdog - periodic reconciliation of persisted status with OS liveness
use crate::application::constants::UNEXPECTED_STOP_MESSAGE;
use crate::application::probe_locks::ProbeLocks;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{LogLevel, NewAlert, Probe, StatusUpdate};
use crate::error::Result;
use crate::port::{AlertSink, ProbeRepository, ProcessRef, ProcessSupervisor, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchdogReport {
    /// Probes persisted as running
    pub checked: usize,
    /// Probes moved to error by this pass
    pub corrected: usize,
}

/// Watchdog service
///
/// For every probe the store believes is running, confirms the analyzer is
/// still alive; dead ones are moved to `error` and a `probe_crashed` alert
/// is raised.
pub struct Watchdog {
    probe_repo: Arc<dyn ProbeRepository>,
    supervisor: Arc<dyn ProcessSupervisor>,
    alerts: Arc<dyn AlertSink>,
    locks: Arc<ProbeLocks>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Watchdog {
    pub fn new(
        probe_repo: Arc<dyn ProbeRepository>,
        supervisor: Arc<dyn ProcessSupervisor>,
        alerts: Arc<dyn AlertSink>,
        locks: Arc<ProbeLocks>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            probe_repo,
            supervisor,
            alerts,
            locks,
            time_provider,
        }
    }

    /// Run one reconciliation pass
    ///
    /// A failure while correcting one probe is logged and does not stop
    /// the pass; only the initial listing can fail the tick.
    pub async fn tick(&self) -> Result<WatchdogReport> {
        let running = self.probe_repo.list_running_probes().await?;
        let mut report = WatchdogReport {
            checked: running.len(),
            corrected: 0,
        };

        for probe in running {
            if self.is_alive(&probe) {
                continue;
            }

            match self.correct(&probe).await {
                Ok(true) => report.corrected += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        probe_id = %probe.id,
                        error = %e,
                        "Failed to record unexpected probe stop"
                    );
                }
            }
        }

        if report.corrected > 0 {
            info!(
                checked = report.checked,
                corrected = report.corrected,
                "Watchdog pass corrected probe status"
            );
        }

        Ok(report)
    }

    fn is_alive(&self, probe: &Probe) -> bool {
        match probe.process_id {
            Some(pid) => self.supervisor.is_running(ProcessRef::Pid(pid)),
            None => self.supervisor.is_running(ProcessRef::Probe(probe.id)),
        }
    }

    /// Move a dead probe to `error`; returns false when another writer
    /// already changed it
    async fn correct(&self, observed: &Probe) -> Result<bool> {
        let _guard = self.locks.lock(observed.id).await;

        // Re-read under the lock: the terminal-event handler or a concurrent
        // pass may have won the race.
        let current = match self.probe_repo.find_probe(observed.id).await? {
            Some(p) => p,
            None => return Ok(false),
        };
        if !current.is_running() || current.process_id != observed.process_id {
            return Ok(false);
        }

        warn!(
            probe_id = %current.id,
            pid = ?current.process_id,
            "Probe process is no longer alive, marking as error"
        );

        let now = self.time_provider.now_millis();
        self.probe_repo
            .update_probe_status(current.id, StatusUpdate::error(UNEXPECTED_STOP_MESSAGE, now))
            .await?;

        self.probe_repo
            .append_log(
                current.id,
                LogLevel::Error,
                UNEXPECTED_STOP_MESSAGE,
                Some(serde_json::json!({ "pid": current.process_id })),
            )
            .await?;

        self.alerts
            .raise(NewAlert::probe_crashed(current.id, &current.name))
            .await?;

        Ok(true)
    }

    /// Run the reconciliation loop until shutdown
    ///
    /// The first pass runs immediately, which also reconciles probes left
    /// `running` by a previous daemon instance.
    pub async fn run(&self, period: Duration, mut shutdown: ShutdownToken) {
        info!(period_secs = period.as_secs(), "Watchdog started");

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = ?e, "Watchdog pass failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Watchdog shutting down");
                    break;
                }
            }
        }
    }
}
