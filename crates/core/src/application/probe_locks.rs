// Per-probe write serialization
//
// The stdout drain, the terminal-event handler, the watchdog and the probe
// service all write the same probe row. Status writes for one probe id go
// through this registry so read-check-write sequences cannot interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::ProbeId;

type LockMap = HashMap<ProbeId, Arc<AsyncMutex<()>>>;

#[derive(Default)]
pub struct ProbeLocks {
    locks: Mutex<LockMap>,
}

/// Held write lock for one probe; the registry entry is dropped with the
/// last holder or waiter
pub struct ProbeLockGuard<'a> {
    locks: &'a ProbeLocks,
    probe_id: ProbeId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProbeLockGuard<'_> {
    fn drop(&mut self) {
        // Release first so our own Arc no longer counts
        self.guard.take();

        let mut locks = self.locks.map();
        let idle = locks
            .get(&self.probe_id)
            .map(|entry| Arc::strong_count(entry) == 1)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.probe_id);
        }
    }
}

impl ProbeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire the write lock for `probe_id`, waiting if another writer holds it
    pub async fn lock(&self, probe_id: ProbeId) -> ProbeLockGuard<'_> {
        // Cloned under the map lock, so a pruning guard always sees waiters
        let entry = Arc::clone(self.map().entry(probe_id).or_default());
        let guard = entry.lock_owned().await;
        ProbeLockGuard {
            locks: self,
            probe_id,
            guard: Some(guard),
        }
    }

    /// Number of probe ids currently locked or awaited
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_probe_is_serialized() {
        let locks = Arc::new(ProbeLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock(7).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_released_with_last_holder() {
        let locks = ProbeLocks::new();

        {
            let _a = locks.lock(1).await;
            let _b = locks.lock(2).await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());

        // Re-locking after release still works
        let _again = locks.lock(1).await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_queued() {
        let locks = Arc::new(ProbeLocks::new());
        let first = locks.lock(3).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(3).await;
                locks.len()
            })
        };
        // Let the waiter register behind the held lock
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1);

        // The waiter still serialized on the same entry
        assert_eq!(waiter.await.unwrap(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_probes_do_not_block() {
        let locks = ProbeLocks::new();
        let _a = locks.lock(1).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(2)).await;
        assert!(b.is_ok());
    }
}
