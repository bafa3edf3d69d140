//! Per-project mutual exclusion for recalculation cycles.
//!
//! # Invariants
//! - At most one closure runs under a given project's lock at a time.
//! - Locks of different projects are independent.
//! - A project's lock is created lazily and kept for the process lifetime.

use crate::model::project::ProjectId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<ProjectId, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock of `project_uuid`.
    pub fn with_project<T>(&self, project_uuid: ProjectId, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(project_uuid);
        let _guard = lock.lock();
        f()
    }

    /// Number of projects that have been locked at least once.
    pub fn tracked_projects(&self) -> usize {
        self.locks.lock().len()
    }

    fn lock_for(&self, project_uuid: ProjectId) -> Arc<Mutex<()>> {
        // The registry guard is released before the project lock is taken.
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(project_uuid).or_default())
    }
}
