// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced last-accessed metering.
//!
//! Every forwarded frame counts as activity, which would hammer the
//! store without a floor. A process-wide map records when each project
//! was last bumped; activity inside the floor is dropped on the spot.
//! Entries are removed when the last interested session closes.

use loft_core::{Clock, ProjectId};
use loft_storage::Store;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum interval between last-accessed bumps per project.
const DEBOUNCE_FLOOR: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ActivityTracker<C: Clock> {
    store: Arc<dyn Store>,
    clock: C,
    last_bump: Arc<Mutex<HashMap<ProjectId, Instant>>>,
    floor: Duration,
}

impl<C: Clock> ActivityTracker<C> {
    pub fn new(store: Arc<dyn Store>, clock: C) -> Self {
        Self { store, clock, last_bump: Arc::new(Mutex::new(HashMap::new())), floor: DEBOUNCE_FLOOR }
    }

    #[cfg(test)]
    fn with_floor(store: Arc<dyn Store>, clock: C, floor: Duration) -> Self {
        Self { store, clock, last_bump: Arc::new(Mutex::new(HashMap::new())), floor }
    }

    /// Record activity. Returns whether a store write was scheduled; the
    /// write itself runs on a detached task so forwarders never block on
    /// the database.
    pub fn touch(&self, id: ProjectId) -> bool {
        if !self.should_bump(id) {
            return false;
        }
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.bump_last_accessed(id).await {
                tracing::warn!(project_id = %id, error = %e, "last-accessed bump failed");
            }
        });
        true
    }

    /// Check-and-set under the map lock; the critical section never
    /// spans the store write.
    fn should_bump(&self, id: ProjectId) -> bool {
        let now = self.clock.now();
        let mut map = self.last_bump.lock();
        match map.get(&id) {
            Some(prev) if now.duration_since(*prev) < self.floor => false,
            _ => {
                map.insert(id, now);
                true
            }
        }
    }

    /// Drop the debounce entry for a project (session close).
    pub fn forget(&self, id: ProjectId) {
        self.last_bump.lock().remove(&id);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.last_bump.lock().len()
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
