//! Supervisor lifecycle against real processes and SQLite
//!
//! Every run goes through ProbeService so the terminal path sees the
//! `running` record it is allowed to close.

mod common;

use std::time::Duration;

use common::{eventually, Harness};
use dvbprobe_core::application::{AnalyzerInvocation, StartOutcome};
use dvbprobe_core::domain::{LogLevel, OutputFormat, Probe, ProbeStatus};
use dvbprobe_core::error::AppError;
use dvbprobe_core::port::{ProbeRepository, ProcessError, ProcessRef, ProcessSupervisor};

const WAIT: Duration = Duration::from_secs(10);

async fn wait_for_status(h: &Harness, probe_id: i64, status: ProbeStatus) -> Probe {
    eventually(WAIT, || async {
        h.repo
            .find_probe(probe_id)
            .await
            .unwrap()
            .filter(|p| p.status == status)
    })
    .await
    .unwrap_or_else(|| panic!("probe {} never reached {}", probe_id, status))
}

async fn wait_for_log(h: &Harness, probe_id: i64, needle: &str) {
    let found = eventually(WAIT, || async {
        let logs = h.repo.logs_for(probe_id, 100).await.unwrap();
        logs.iter().any(|l| l.message.contains(needle)).then_some(())
    })
    .await;
    assert!(found.is_some(), "log containing {:?} never appeared", needle);
}

#[tokio::test]
async fn test_json_line_then_clean_exit() {
    let h = Harness::with_script(r#"echo '{"bitrate":5000000,"packets":42}'"#).await;
    let probe = h.provision(OutputFormat::Json).await;

    let outcome = h.service.start(probe.id).await.unwrap();
    let started = match outcome {
        StartOutcome::Started(p) => p,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(started.status, ProbeStatus::Running);
    assert!(started.process_id.is_some());
    assert!(started.error.is_none());

    let stopped = wait_for_status(&h, probe.id, ProbeStatus::Stopped).await;
    assert!(stopped.stopped_at.is_some());
    assert!(stopped.error.is_none());

    let analyses = h.repo.analyses_for(probe.id, 10).await.unwrap();
    assert_eq!(analyses.len(), 1);
    assert_eq!(
        analyses[0].payload,
        serde_json::json!({"bitrate": 5000000, "packets": 42})
    );
    assert_eq!(analyses[0].stream_id, probe.stream_id);

    wait_for_log(&h, probe.id, "Process exited with code 0").await;
}

#[tokio::test]
async fn test_handle_released_after_exit() {
    let h = Harness::with_script("exit 0").await;
    let probe = h.provision(OutputFormat::Text).await;

    h.service.start(probe.id).await.unwrap();

    let released = eventually(WAIT, || async {
        h.supervisor.active_processes().is_empty().then_some(())
    })
    .await;
    assert!(released.is_some());
    assert!(!h.supervisor.is_running(ProcessRef::Probe(probe.id)));

    // No stdout at all is reported
    wait_for_log(&h, probe.id, "no output data received").await;
}

#[tokio::test]
async fn test_nonzero_exit_records_error_and_stderr() {
    let h = Harness::with_script("printf '  fatal error\\n' >&2; exit 1").await;
    let probe = h.provision(OutputFormat::Text).await;

    h.service.start(probe.id).await.unwrap();

    let failed = wait_for_status(&h, probe.id, ProbeStatus::Error).await;
    assert_eq!(
        failed.error.as_deref(),
        Some("Process terminated with exit code 1")
    );
    assert!(failed.stopped_at.is_some());

    wait_for_log(&h, probe.id, "stderr: fatal error").await;

    let logs = h.repo.logs_for(probe.id, 100).await.unwrap();
    let errors: Vec<&str> = logs
        .iter()
        .filter(|l| l.level == LogLevel::Error)
        .map(|l| l.message.as_str())
        .collect();
    assert!(errors.len() >= 2, "error logs: {:?}", errors);
    // Stderr chunks are stored verbatim
    assert!(errors.contains(&"  fatal error\n"), "error logs: {:?}", errors);
    assert!(errors.contains(&"Process terminated with exit code 1"));
}

#[tokio::test]
async fn test_missing_executable_fails_start() {
    let h = Harness::with_invocation(AnalyzerInvocation::direct(
        "/nonexistent/dvbprobe-analyzer",
    ))
    .await;
    let probe = h.provision(OutputFormat::Text).await;

    let err = h.service.start(probe.id).await.unwrap_err();
    assert!(
        matches!(err, AppError::Process(ProcessError::SpawnFailed(_))),
        "got {:?}",
        err
    );
    assert!(h.supervisor.active_processes().is_empty());

    let failed = wait_for_status(&h, probe.id, ProbeStatus::Error).await;
    assert!(failed
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("/nonexistent/dvbprobe-analyzer"));

    wait_for_log(&h, probe.id, "Failed to start probe").await;
    wait_for_log(&h, probe.id, "Process error").await;
}

#[tokio::test]
async fn test_stop_long_running_process() {
    let h = Harness::with_script("exec sleep 30").await;
    let probe = h.provision(OutputFormat::Text).await;

    let started = h.service.start(probe.id).await.unwrap();
    let pid = started.probe().process_id.unwrap();
    assert!(h.supervisor.is_running(ProcessRef::Probe(probe.id)));

    let view = h.service.status(probe.id).await.unwrap();
    assert_eq!(view.status, ProbeStatus::Running);
    assert_eq!(view.process_id, Some(pid));

    let stopped = h.service.stop(probe.id).await.unwrap();
    assert_eq!(stopped.status, ProbeStatus::Stopped);
    assert!(stopped.stopped_at.is_some());
    assert!(h.supervisor.active_processes().is_empty());

    // SIGTERM is reported as a plain exit and does not override the stop
    wait_for_log(&h, probe.id, "Process exited with code").await;
    let after = h.repo.find_probe(probe.id).await.unwrap().unwrap();
    assert_eq!(after.status, ProbeStatus::Stopped);
    assert!(after.error.is_none());

    wait_for_log(&h, probe.id, "Probe stopped").await;
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill() {
    let h = Harness::with_script("trap '' TERM; exec sleep 30").await;
    let probe = h.provision(OutputFormat::Text).await;

    let started = h.service.start(probe.id).await.unwrap();
    let pid = started.probe().process_id.unwrap();

    let requested = tokio::time::Instant::now();
    let stopped = h.service.stop(probe.id).await.unwrap();
    assert_eq!(stopped.status, ProbeStatus::Stopped);

    // SIGTERM is ignored: still alive well before the deadline
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.supervisor.is_running(ProcessRef::Pid(pid)));

    let dead = eventually(WAIT, || async {
        (!h.supervisor.is_running(ProcessRef::Pid(pid))).then_some(())
    })
    .await;
    assert!(dead.is_some(), "pid {} survived SIGKILL", pid);
    assert!(requested.elapsed() >= Duration::from_secs(4));

    wait_for_log(&h, probe.id, "Process exited with code").await;
    let after = h.repo.find_probe(probe.id).await.unwrap().unwrap();
    assert_eq!(after.status, ProbeStatus::Stopped);
    assert!(after.error.is_none());
}

#[tokio::test]
async fn test_second_start_while_running_is_noop() {
    let h = Harness::with_script("exec sleep 30").await;
    let probe = h.provision(OutputFormat::Text).await;

    let first = h.service.start(probe.id).await.unwrap();
    let second = h.service.start(probe.id).await.unwrap();

    assert!(matches!(second, StartOutcome::AlreadyRunning(_)));
    assert_eq!(second.probe().process_id, first.probe().process_id);
    assert_eq!(h.supervisor.active_processes().len(), 1);

    h.service.stop(probe.id).await.unwrap();
}

#[tokio::test]
async fn test_stop_when_not_running_returns_probe_unchanged() {
    let h = Harness::with_script("exit 0").await;
    let probe = h.provision(OutputFormat::Text).await;

    let unchanged = h.service.stop(probe.id).await.unwrap();
    assert_eq!(unchanged.status, ProbeStatus::Stopped);
    assert!(unchanged.stopped_at.is_none());

    let err = h.service.stop(probe.id + 100).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_restart_after_clean_exit() {
    let h = Harness::with_script(r#"echo '{"run":1}'"#).await;
    let probe = h.provision(OutputFormat::Json).await;

    h.service.start(probe.id).await.unwrap();
    wait_for_status(&h, probe.id, ProbeStatus::Stopped).await;
    eventually(WAIT, || async {
        h.supervisor.active_processes().is_empty().then_some(())
    })
    .await
    .unwrap();

    let again = h.service.start(probe.id).await.unwrap();
    assert!(matches!(again, StartOutcome::Started(_)));
    wait_for_status(&h, probe.id, ProbeStatus::Stopped).await;

    let analyses = eventually(WAIT, || async {
        let analyses = h.repo.analyses_for(probe.id, 10).await.unwrap();
        (analyses.len() == 2).then_some(analyses)
    })
    .await;
    assert!(analyses.is_some());
}
