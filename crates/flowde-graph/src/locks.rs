use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flowde_core::types::AssignmentId;
use tokio::sync::OwnedMutexGuard;

/// Per-assignment async locks. Operations on one assignment run one at a
/// time; different assignments never wait on each other.
pub struct AssignmentLocks {
    locks: Mutex<HashMap<AssignmentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl AssignmentLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `assignment`. Held until the guard drops.
    pub async fn acquire(&self, assignment: AssignmentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(assignment).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry of a deleted assignment.
    pub fn forget(&self, assignment: AssignmentId) {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&assignment);
    }

    /// Number of assignments with a lock entry.
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for AssignmentLocks {
    fn default() -> Self {
        Self::new()
    }
}
