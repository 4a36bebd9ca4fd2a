// Subprocess supervisor
// reason: tokio::process for async child management, nix for signals
//
// Each run gets two pipe readers feeding a bounded channel and one pipeline
// task that owns the child. The pipeline persists decoded stdout as it
// arrives and runs the terminal bookkeeping exactly once, after the child
// is reaped and the pipes are drained.

use async_trait::async_trait;
use serde_json::json;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use dvbprobe_core::application::constants::{
    GRACEFUL_STOP_TIMEOUT, MAX_PENDING_STDOUT, OUTPUT_CHANNEL_CAPACITY, OUTPUT_DRAIN_GRACE,
    OUTPUT_READ_CHUNK_SIZE, STDERR_TAIL_LIMIT,
};
use dvbprobe_core::application::{decode, CommandBuilder, ProbeLocks};
use dvbprobe_core::domain::{
    AnalysisRecord, LogLevel, OutputFormat, Probe, ProbeId, StatusUpdate, StreamId,
};
use dvbprobe_core::port::{
    ActiveProcess, ProbeRepository, ProcessError, ProcessRef, ProcessSupervisor, TimeProvider,
};

use crate::os_process::{self, Delivery, StopSignal};
use crate::process_table::{ProcessHandle, ProcessTable};

const NO_OUTPUT_MESSAGE: &str = "Process terminated but no output data received";

enum OutputEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Supervisor backed by tokio child processes
pub struct SubprocessSupervisor {
    probe_repo: Arc<dyn ProbeRepository>,
    command_builder: CommandBuilder,
    table: Arc<ProcessTable>,
    locks: Arc<ProbeLocks>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SubprocessSupervisor {
    pub fn new(
        probe_repo: Arc<dyn ProbeRepository>,
        command_builder: CommandBuilder,
        table: Arc<ProcessTable>,
        locks: Arc<ProbeLocks>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            probe_repo,
            command_builder,
            table,
            locks,
            time_provider,
        }
    }

    fn spawn_child(argv: &[String]) -> Result<(u32, Child), ProcessError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ProcessError::SpawnFailed("empty command".to_string()))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(format!("{}: {}", program, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| ProcessError::SpawnFailed("child exited before registration".to_string()))?;

        Ok((pid, child))
    }

    /// Spawn failure is terminal for the run: record it like an exit
    fn record_spawn_failure(&self, probe_id: ProbeId, reason: String, argv: Vec<String>) {
        let repo = Arc::clone(&self.probe_repo);
        let locks = Arc::clone(&self.locks);
        let now = self.time_provider.now_millis();

        // The caller may hold this probe's lock until start() returns
        tokio::spawn(async move {
            let _guard = locks.lock(probe_id).await;

            if let Err(e) = repo
                .append_log(
                    probe_id,
                    LogLevel::Error,
                    &format!("Process error: {}", reason),
                    Some(json!({ "command": argv })),
                )
                .await
            {
                error!(probe_id = %probe_id, error = %e, "Failed to log spawn failure");
            }

            match repo.find_probe(probe_id).await {
                // Another run owns the record
                Ok(Some(p)) if p.is_running() => {}
                Ok(Some(_)) => {
                    if let Err(e) = repo
                        .update_probe_status(probe_id, StatusUpdate::error(reason, now))
                        .await
                    {
                        error!(probe_id = %probe_id, error = %e, "Failed to record spawn failure");
                    }
                }
                Ok(None) => {}
                Err(e) => error!(probe_id = %probe_id, error = %e, "Failed to read probe"),
            }
        });
    }

    /// Stop every live process and wait for their terminal bookkeeping
    ///
    /// Used on daemon shutdown. Returns the number of processes signalled.
    pub async fn stop_all(&self) -> usize {
        let handles: Vec<ProcessHandle> = self
            .table
            .active()
            .into_iter()
            .filter_map(|p| self.table.find(ProcessRef::Probe(p.probe_id)))
            .collect();

        for handle in &handles {
            if let Err(e) = self.stop(ProcessRef::Probe(handle.probe_id)).await {
                warn!(probe_id = %handle.probe_id, error = %e, "Failed to stop probe on shutdown");
            }
        }

        let deadline = Instant::now() + GRACEFUL_STOP_TIMEOUT + OUTPUT_DRAIN_GRACE;
        while handles.iter().any(|h| !h.is_finished()) && Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        handles.len()
    }
}

#[async_trait]
impl ProcessSupervisor for SubprocessSupervisor {
    async fn start(&self, probe: &Probe) -> Result<u32, ProcessError> {
        let stream = self
            .probe_repo
            .find_stream(probe.stream_id)
            .await
            .map_err(|e| ProcessError::Persistence(e.to_string()))?
            .ok_or_else(|| ProcessError::NotFound(format!("stream {}", probe.stream_id)))?;

        let argv = self.command_builder.build(probe, &stream);
        let format = self.command_builder.effective_output_format(probe);
        let now = self.time_provider.now_millis();

        let (handle, mut child) =
            match self
                .table
                .register_with(probe.id, now, || Self::spawn_child(&argv))
            {
                Ok(registered) => registered,
                Err(ProcessError::SpawnFailed(reason)) => {
                    error!(probe_id = %probe.id, error = %reason, "Failed to spawn analyzer");
                    self.record_spawn_failure(probe.id, reason.clone(), argv);
                    return Err(ProcessError::SpawnFailed(reason));
                }
                Err(e) => return Err(e),
            };

        let pid = handle.pid;
        info!(probe_id = %probe.id, pid = pid, command = ?argv, "Analyzer spawned");

        if let Err(e) = self
            .probe_repo
            .append_log(
                probe.id,
                LogLevel::Info,
                &format!("Probe started with PID: {}", pid),
                Some(json!({ "pid": pid, "command": argv })),
            )
            .await
        {
            error!(probe_id = %probe.id, error = %e, "Failed to log probe start");
        }

        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, tx.clone(), OutputEvent::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, tx.clone(), OutputEvent::Stderr));
        }
        drop(tx);

        let pipeline = RunPipeline {
            probe_repo: Arc::clone(&self.probe_repo),
            table: Arc::clone(&self.table),
            locks: Arc::clone(&self.locks),
            time_provider: Arc::clone(&self.time_provider),
            handle,
            stream_id: stream.id,
            format,
        };
        tokio::spawn(pipeline.run(child, rx));

        Ok(pid)
    }

    async fn stop(&self, target: ProcessRef) -> Result<(), ProcessError> {
        let handle = self
            .table
            .take(target)
            .ok_or_else(|| ProcessError::NotFound(target.to_string()))?;

        if handle.is_reaped() {
            return Ok(());
        }

        match os_process::send_stop_signal(handle.pid, StopSignal::Graceful)? {
            Delivery::NoSuchProcess => return Ok(()),
            Delivery::Sent => {}
        }

        tokio::spawn(async move {
            tokio::time::sleep(GRACEFUL_STOP_TIMEOUT).await;
            if handle.is_reaped() {
                return;
            }
            warn!(
                probe_id = %handle.probe_id,
                pid = handle.pid,
                "Process did not exit after SIGTERM, sending SIGKILL"
            );
            if let Err(e) = os_process::send_stop_signal(handle.pid, StopSignal::Forceful) {
                error!(pid = handle.pid, error = %e, "Forceful kill failed");
            }
        });

        Ok(())
    }

    fn is_running(&self, target: ProcessRef) -> bool {
        if let Some(handle) = self.table.find(target) {
            return !handle.is_finished();
        }
        match target {
            ProcessRef::Pid(pid) => os_process::is_alive(pid),
            ProcessRef::Probe(_) => false,
        }
    }

    fn active_processes(&self) -> Vec<ActiveProcess> {
        self.table.active()
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<OutputEvent>, wrap: fn(Vec<u8>) -> OutputEvent)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; OUTPUT_READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Pipe read failed");
                break;
            }
        }
    }
}

#[derive(Default)]
struct DrainState {
    /// Stdout after the last newline, not yet decoded
    pending: Vec<u8>,
    stdout_bytes: usize,
    stderr_bytes: usize,
    stderr_tail: Vec<u8>,
}

impl DrainState {
    fn push_stderr(&mut self, bytes: &[u8]) {
        self.stderr_bytes += bytes.len();
        self.stderr_tail.extend_from_slice(bytes);
        if self.stderr_tail.len() > STDERR_TAIL_LIMIT {
            let excess = self.stderr_tail.len() - STDERR_TAIL_LIMIT;
            self.stderr_tail.drain(..excess);
        }
    }

    /// Complete lines ready for decoding, if any
    fn take_complete_lines(&mut self) -> Option<Vec<u8>> {
        if self.pending.len() > MAX_PENDING_STDOUT {
            return Some(std::mem::take(&mut self.pending));
        }
        let last_newline = self.pending.iter().rposition(|b| *b == b'\n')?;
        Some(self.pending.drain(..=last_newline).collect())
    }
}

/// Per-run pipeline: output persistence plus the single terminal path
struct RunPipeline {
    probe_repo: Arc<dyn ProbeRepository>,
    table: Arc<ProcessTable>,
    locks: Arc<ProbeLocks>,
    time_provider: Arc<dyn TimeProvider>,
    handle: ProcessHandle,
    stream_id: StreamId,
    format: OutputFormat,
}

impl RunPipeline {
    async fn run(self, mut child: Child, mut rx: mpsc::Receiver<OutputEvent>) {
        let mut state = DrainState::default();
        let mut channel_open = true;

        let status = loop {
            tokio::select! {
                event = rx.recv(), if channel_open => match event {
                    Some(event) => self.on_output(&mut state, event).await,
                    None => channel_open = false,
                },
                status = child.wait() => break status,
            }
        };
        self.handle.mark_reaped();

        // Output still in the pipes when the process exited
        let deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
        while channel_open {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some(event)) => self.on_output(&mut state, event).await,
                Ok(None) => channel_open = false,
                Err(_) => {
                    warn!(
                        probe_id = %self.handle.probe_id,
                        "Output pipes still open after exit, closing run"
                    );
                    break;
                }
            }
        }

        self.finish(state, status).await;
    }

    async fn on_output(&self, state: &mut DrainState, event: OutputEvent) {
        match event {
            OutputEvent::Stdout(bytes) => {
                state.stdout_bytes += bytes.len();
                state.pending.extend_from_slice(&bytes);
                if let Some(lines) = state.take_complete_lines() {
                    self.persist_decoded(&String::from_utf8_lossy(&lines), "")
                        .await;
                }
            }
            OutputEvent::Stderr(bytes) => {
                state.push_stderr(&bytes);
                // Raw chunk, as written by the analyzer
                let text = String::from_utf8_lossy(&bytes);
                let _guard = self.locks.lock(self.handle.probe_id).await;
                self.log(LogLevel::Error, &text, None).await;
            }
        }
    }

    async fn persist_decoded(&self, stdout: &str, stderr: &str) {
        let decoded = match decode(stdout, stderr, self.format) {
            Some(decoded) => decoded,
            None => return,
        };

        let record = AnalysisRecord {
            probe_id: self.handle.probe_id,
            stream_id: self.stream_id,
            payload: decoded.into_payload(),
            timestamp: self.time_provider.now_millis(),
        };

        let _guard = self.locks.lock(self.handle.probe_id).await;
        if let Err(e) = self.probe_repo.insert_analysis(&record).await {
            error!(probe_id = %record.probe_id, error = %e, "Failed to persist analysis");
        }
    }

    async fn log(&self, level: LogLevel, message: &str, data: Option<serde_json::Value>) {
        if let Err(e) = self
            .probe_repo
            .append_log(self.handle.probe_id, level, message, data)
            .await
        {
            error!(probe_id = %self.handle.probe_id, error = %e, "Failed to append probe log");
        }
    }

    async fn finish(self, mut state: DrainState, status: std::io::Result<ExitStatus>) {
        let probe_id = self.handle.probe_id;
        let pid = self.handle.pid;
        let stderr_tail = String::from_utf8_lossy(&state.stderr_tail).into_owned();

        let remainder = String::from_utf8_lossy(&std::mem::take(&mut state.pending)).into_owned();
        if !remainder.trim().is_empty() {
            self.persist_decoded(&remainder, &stderr_tail).await;
        }

        let _guard = self.locks.lock(probe_id).await;

        if state.stdout_bytes == 0 {
            self.log(LogLevel::Warn, NO_OUTPUT_MESSAGE, None).await;
        }

        let now = self.time_provider.now_millis();
        let update = match &status {
            Ok(exit) if exit.success() || exit.code().is_none() => {
                info!(probe_id = %probe_id, pid = pid, status = %exit, "Analyzer exited");
                self.log(
                    LogLevel::Info,
                    &format!("Process exited with code {}", describe_code(exit)),
                    Some(json!({ "pid": pid, "code": exit.code() })),
                )
                .await;
                StatusUpdate::stopped(now)
            }
            Ok(exit) => {
                let code = exit.code().unwrap_or_default();
                let reason = format!("Process terminated with exit code {}", code);
                warn!(probe_id = %probe_id, pid = pid, code = code, "Analyzer failed");
                self.log(
                    LogLevel::Error,
                    &reason,
                    Some(json!({ "pid": pid, "code": code })),
                )
                .await;
                if state.stderr_bytes > 0 {
                    self.log(LogLevel::Error, &format!("stderr: {}", stderr_tail.trim()), None)
                        .await;
                }
                StatusUpdate::error(reason, now)
            }
            Err(e) => {
                let reason = format!("Failed to wait for process: {}", e);
                error!(probe_id = %probe_id, pid = pid, error = %e, "Lost track of analyzer");
                self.log(LogLevel::Error, &reason, Some(json!({ "pid": pid })))
                    .await;
                StatusUpdate::error(reason, now)
            }
        };

        // Only the run that owns the record may close it: a stop request or
        // a newer run may already have written
        match self.probe_repo.find_probe(probe_id).await {
            Ok(Some(current)) if current.is_running() && current.process_id == Some(pid) => {
                if let Err(e) = self.probe_repo.update_probe_status(probe_id, update).await {
                    error!(probe_id = %probe_id, error = %e, "Failed to record exit status");
                }
            }
            Ok(Some(current)) => {
                debug!(
                    probe_id = %probe_id,
                    pid = pid,
                    status = %current.status,
                    "Run already closed, keeping persisted status"
                );
            }
            Ok(None) => {}
            Err(e) => error!(probe_id = %probe_id, error = %e, "Failed to read probe"),
        }

        self.table.remove_run(probe_id, pid);
        self.handle.mark_finished();
    }
}

fn describe_code(exit: &ExitStatus) -> String {
    match exit.code() {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines_keep_partial_tail() {
        let mut state = DrainState::default();
        state.pending.extend_from_slice(b"{\"a\":1}\n{\"b\"");

        assert_eq!(state.take_complete_lines().unwrap(), b"{\"a\":1}\n".to_vec());
        assert_eq!(state.pending, b"{\"b\"".to_vec());
        assert!(state.take_complete_lines().is_none());
    }

    #[test]
    fn test_oversized_line_is_flushed() {
        let mut state = DrainState::default();
        state.pending = vec![b'x'; MAX_PENDING_STDOUT + 1];

        assert_eq!(state.take_complete_lines().unwrap().len(), MAX_PENDING_STDOUT + 1);
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let mut state = DrainState::default();
        state.push_stderr(&vec![b'a'; STDERR_TAIL_LIMIT]);
        state.push_stderr(b"fatal");

        assert_eq!(state.stderr_tail.len(), STDERR_TAIL_LIMIT);
        assert!(state.stderr_tail.ends_with(b"fatal"));
        assert_eq!(state.stderr_bytes, STDERR_TAIL_LIMIT + 5);
    }
}
