// Registry of live analyzer processes
//
// Constructed once by the composition root and shared by reference; never
// global. At most one handle per probe id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dvbprobe_core::domain::ProbeId;
use dvbprobe_core::port::{ActiveProcess, ProcessError, ProcessRef};

#[derive(Debug, Default)]
struct RunFlags {
    /// OS process waited on; its pid may be reused from here on
    reaped: AtomicBool,
    /// Terminal bookkeeping persisted
    finished: AtomicBool,
}

/// In-memory handle for one run; never persisted
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub probe_id: ProbeId,
    pub pid: u32,
    pub started_at: i64, // epoch ms
    flags: Arc<RunFlags>,
}

impl ProcessHandle {
    pub fn is_reaped(&self) -> bool {
        self.flags.reaped.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_reaped(&self) {
        self.flags.reaped.store(true, Ordering::SeqCst);
    }

    /// The run is over and its final status has been written
    pub fn is_finished(&self) -> bool {
        self.flags.finished.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_finished(&self) {
        self.flags.finished.store(true, Ordering::SeqCst);
    }

    fn snapshot(&self) -> ActiveProcess {
        ActiveProcess {
            probe_id: self.probe_id,
            pid: self.pid,
            started_at: self.started_at,
        }
    }
}

#[derive(Default)]
pub struct ProcessTable {
    handles: Mutex<HashMap<ProbeId, ProcessHandle>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProbeId, ProcessHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Launch and register under one critical section
    ///
    /// `launch` runs only when no handle exists for `probe_id` and must not
    /// block; it returns the OS pid plus whatever the caller needs to keep.
    pub fn register_with<T, F>(
        &self,
        probe_id: ProbeId,
        started_at: i64,
        launch: F,
    ) -> Result<(ProcessHandle, T), ProcessError>
    where
        F: FnOnce() -> Result<(u32, T), ProcessError>,
    {
        let mut handles = self.lock();
        if let Some(existing) = handles.get(&probe_id) {
            return Err(ProcessError::AlreadyRunning {
                probe_id,
                pid: existing.pid,
            });
        }

        let (pid, extra) = launch()?;
        let handle = ProcessHandle {
            probe_id,
            pid,
            started_at,
            flags: Arc::new(RunFlags::default()),
        };
        handles.insert(probe_id, handle.clone());
        Ok((handle, extra))
    }

    pub fn find(&self, target: ProcessRef) -> Option<ProcessHandle> {
        let handles = self.lock();
        match target {
            ProcessRef::Probe(id) => handles.get(&id).cloned(),
            ProcessRef::Pid(pid) => handles.values().find(|h| h.pid == pid).cloned(),
        }
    }

    /// Remove and return the handle matching `target`
    pub fn take(&self, target: ProcessRef) -> Option<ProcessHandle> {
        let mut handles = self.lock();
        let probe_id = match target {
            ProcessRef::Probe(id) => id,
            ProcessRef::Pid(pid) => *handles.iter().find(|(_, h)| h.pid == pid)?.0,
        };
        handles.remove(&probe_id)
    }

    /// Remove the handle for `probe_id` only if it still belongs to `pid`
    ///
    /// A later run of the same probe may already own the slot.
    pub fn remove_run(&self, probe_id: ProbeId, pid: u32) -> bool {
        let mut handles = self.lock();
        match handles.get(&probe_id) {
            Some(h) if h.pid == pid => {
                handles.remove(&probe_id);
                true
            }
            _ => false,
        }
    }

    pub fn active(&self) -> Vec<ActiveProcess> {
        let mut active: Vec<ActiveProcess> =
            self.lock().values().map(ProcessHandle::snapshot).collect();
        active.sort_by_key(|p| p.probe_id);
        active
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
