use alloc::collections::VecDeque;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use tokio::sync::oneshot;

/// Process-local single-flight lock table keyed by cache file path.
///
/// The first caller to [`lock`](PathLocks::lock) a path proceeds immediately;
/// later callers queue behind it and are served in FIFO order as each holder
/// releases. A path appears in the table iff some caller currently owns it.
/// Keying by the local file path rather than the URL keeps all concurrency
/// control colocated with the resource being materialized.
pub(crate) struct PathLocks {
    table: Mutex<HashMap<PathBuf, LockEntry>>,
}

struct LockEntry {
    /// Waiters in arrival order; the head is woken on each release.
    waiters: VecDeque<oneshot::Sender<()>>,
    /// Wall-clock instant of the last enqueue or hand-off.
    touched: SystemTime,
}

impl PathLocks {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire ownership of `path`, waiting FIFO behind the current holder.
    ///
    /// The returned guard releases on drop, so acquisition and release stay
    /// balanced on success and error paths alike.
    pub(crate) async fn lock(&self, path: &Path) -> PathGuard<'_> {
        let waiter = {
            let mut table = self.table.lock().expect("lock table poisoned");
            match table.entry(path.to_path_buf()) {
                Entry::Vacant(slot) => {
                    slot.insert(LockEntry {
                        waiters: VecDeque::new(),
                        touched: SystemTime::now(),
                    });
                    None
                }
                Entry::Occupied(mut slot) => {
                    let (tx, rx) = oneshot::channel();
                    let entry = slot.get_mut();
                    entry.waiters.push_back(tx);
                    entry.touched = SystemTime::now();
                    Some(rx)
                }
            }
        };
        if let Some(rx) = waiter {
            // The sender half is dropped without sending only when this
            // receiver is already gone, so the Err arm is unreachable while
            // we are still waiting.
            let _ = rx.await;
        }
        PathGuard {
            locks: self,
            path: path.to_path_buf(),
        }
    }

    /// Hand ownership of `path` to the next waiter, or retire the entry when
    /// the queue is empty.
    fn unlock(&self, path: &Path) {
        let mut table = self.table.lock().expect("lock table poisoned");
        let Some(entry) = table.get_mut(path) else {
            return;
        };
        while let Some(next) = entry.waiters.pop_front() {
            if next.send(()).is_ok() {
                entry.touched = SystemTime::now();
                return;
            }
            // Waiter gave up (its future was dropped); try the next in line.
        }
        table.remove(path);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().expect("lock table poisoned").len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ownership of one lock-table key; releases on drop.
pub(crate) struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: PathBuf,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.locks.unlock(&self.path);
    }
}
