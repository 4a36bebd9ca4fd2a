// Process Supervisor Port
// Abstraction over the live analyzer processes started by this daemon

use crate::domain::{Probe, ProbeId};
use async_trait::async_trait;
use thiserror::Error;

/// Lookup key for a supervised process: probe id or raw OS pid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRef {
    Probe(ProbeId),
    Pid(u32),
}

impl std::fmt::Display for ProcessRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessRef::Probe(id) => write!(f, "probe {}", id),
            ProcessRef::Pid(pid) => write!(f, "pid {}", pid),
        }
    }
}

/// Snapshot of one live handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveProcess {
    pub probe_id: ProbeId,
    pub pid: u32,
    pub started_at: i64, // epoch ms
}

/// Synchronous supervisor errors
///
/// Exit codes and late spawn failures never surface here; they are recorded
/// on the probe by the terminal-event handler.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Probe {probe_id} already has a live process (pid {pid})")]
    AlreadyRunning { probe_id: ProbeId, pid: u32 },

    #[error("Signal delivery failed: {0}")]
    Signal(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Process Supervisor trait
///
/// Implementations:
/// - SubprocessSupervisor: spawns the analyzer as a tokio child process
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Spawn the analyzer for `probe` and register its handle
    ///
    /// # Errors
    /// - ProcessError::NotFound if the probe's stream does not exist
    /// - ProcessError::SpawnFailed if the executable cannot be launched
    /// - ProcessError::AlreadyRunning if a handle is already registered
    async fn start(&self, probe: &Probe) -> Result<u32, ProcessError>;

    /// Request termination (graceful, then forceful after the deadline)
    ///
    /// # Errors
    /// - ProcessError::NotFound if no handle matches `target`
    async fn stop(&self, target: ProcessRef) -> Result<(), ProcessError>;

    /// Handle-backed answer when held, OS liveness of the pid otherwise
    fn is_running(&self, target: ProcessRef) -> bool;

    /// Currently registered handles
    fn active_processes(&self) -> Vec<ActiveProcess>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Mock supervisor with scripted liveness
    pub struct MockProcessSupervisor {
        next_pid: Mutex<u32>,
        handles: Mutex<HashMap<ProbeId, u32>>,
        alive_pids: Mutex<HashSet<u32>>,
        fail_spawn: Mutex<Option<String>>,
        missing_stream: Mutex<bool>,
        start_calls: Mutex<usize>,
        stop_calls: Mutex<Vec<ProcessRef>>,
    }

    impl MockProcessSupervisor {
        pub fn new() -> Self {
            Self {
                next_pid: Mutex::new(1000),
                handles: Mutex::new(HashMap::new()),
                alive_pids: Mutex::new(HashSet::new()),
                fail_spawn: Mutex::new(None),
                missing_stream: Mutex::new(false),
                start_calls: Mutex::new(0),
                stop_calls: Mutex::new(Vec::new()),
            }
        }

        /// Make subsequent `start` calls fail with SpawnFailed
        pub fn fail_spawn_with(&self, message: impl Into<String>) {
            *self.fail_spawn.lock().unwrap() = Some(message.into());
        }

        /// Make subsequent `start` calls fail with NotFound, as if the
        /// probe's stream were missing
        pub fn fail_missing_stream(&self) {
            *self.missing_stream.lock().unwrap() = true;
        }

        /// Mark an unmanaged pid as alive at the OS level
        pub fn set_pid_alive(&self, pid: u32, alive: bool) {
            let mut pids = self.alive_pids.lock().unwrap();
            if alive {
                pids.insert(pid);
            } else {
                pids.remove(&pid);
            }
        }

        pub fn start_calls(&self) -> usize {
            *self.start_calls.lock().unwrap()
        }

        pub fn stop_calls(&self) -> Vec<ProcessRef> {
            self.stop_calls.lock().unwrap().clone()
        }
    }

    impl Default for MockProcessSupervisor {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ProcessSupervisor for MockProcessSupervisor {
        async fn start(&self, probe: &Probe) -> Result<u32, ProcessError> {
            *self.start_calls.lock().unwrap() += 1;

            if let Some(message) = self.fail_spawn.lock().unwrap().clone() {
                return Err(ProcessError::SpawnFailed(message));
            }
            if *self.missing_stream.lock().unwrap() {
                return Err(ProcessError::NotFound(format!("stream {}", probe.stream_id)));
            }

            let mut handles = self.handles.lock().unwrap();
            if let Some(pid) = handles.get(&probe.id) {
                return Err(ProcessError::AlreadyRunning {
                    probe_id: probe.id,
                    pid: *pid,
                });
            }

            let mut next_pid = self.next_pid.lock().unwrap();
            let pid = *next_pid;
            *next_pid += 1;
            handles.insert(probe.id, pid);
            self.alive_pids.lock().unwrap().insert(pid);
            Ok(pid)
        }

        async fn stop(&self, target: ProcessRef) -> Result<(), ProcessError> {
            self.stop_calls.lock().unwrap().push(target);

            let mut handles = self.handles.lock().unwrap();
            let key = handles
                .iter()
                .find(|(probe_id, pid)| match target {
                    ProcessRef::Probe(id) => **probe_id == id,
                    ProcessRef::Pid(p) => **pid == p,
                })
                .map(|(probe_id, _)| *probe_id);

            match key.and_then(|k| handles.remove(&k)) {
                Some(pid) => {
                    self.alive_pids.lock().unwrap().remove(&pid);
                    Ok(())
                }
                None => Err(ProcessError::NotFound(target.to_string())),
            }
        }

        fn is_running(&self, target: ProcessRef) -> bool {
            match target {
                ProcessRef::Probe(id) => self.handles.lock().unwrap().contains_key(&id),
                ProcessRef::Pid(pid) => self.alive_pids.lock().unwrap().contains(&pid),
            }
        }

        fn active_processes(&self) -> Vec<ActiveProcess> {
            self.handles
                .lock()
                .unwrap()
                .iter()
                .map(|(probe_id, pid)| ActiveProcess {
                    probe_id: *probe_id,
                    pid: *pid,
                    started_at: 0,
                })
                .collect()
        }
    }
}
