// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle sweeper.
//!
//! A recurring task that stops running projects whose idle timeout has
//! lapsed. Failures are logged and left alone: the project stays
//! `running`, so the next tick simply retries it.

use crate::error::EngineError;
use crate::lifecycle::EngineConfig;
use loft_adapters::MachineProvider;
use loft_core::Clock;
use loft_storage::{ProjectRecord, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct IdleSweeper<C: Clock> {
    store: Arc<dyn Store>,
    provider: Arc<dyn MachineProvider>,
    config: Arc<EngineConfig>,
    clock: C,
}

impl<C: Clock> IdleSweeper<C> {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn MachineProvider>,
        config: Arc<EngineConfig>,
        clock: C,
    ) -> Self {
        Self { store, provider, config, clock }
    }

    /// Run forever on the configured interval.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep_once().await {
                    Ok(0) => {}
                    Ok(evicted) => tracing::info!(evicted, "idle sweep complete"),
                    Err(e) => tracing::warn!(error = %e, "idle sweep failed"),
                }
            }
        })
    }

    /// One pass over running projects; returns how many were stopped.
    pub async fn sweep_once(&self) -> Result<usize, EngineError> {
        let running = self.store.running_projects(self.config.sweep_page_size).await?;
        let now = self.clock.now_utc();

        let mut evicted = 0;
        for project in running {
            if !is_idle(&project, now) {
                continue;
            }
            match self.evict(&project).await {
                Ok(()) => {
                    evicted += 1;
                    tracing::info!(project_id = %project.id, "idle project stopped");
                }
                Err(e) => {
                    // Project stays running; next tick retries.
                    tracing::warn!(project_id = %project.id, error = %e, "idle eviction failed");
                }
            }
        }
        Ok(evicted)
    }

    async fn evict(&self, project: &ProjectRecord) -> Result<(), EngineError> {
        let Some(machine) = project.machine_id.clone() else {
            // Running without a machine is a bookkeeping bug; surface it.
            return Err(EngineError::Unresolvable("running project has no machine".to_string()));
        };

        // Stop the machine before touching the row so a provider failure
        // leaves the project running (and retried next tick).
        self.provider.stop_machine(&machine).await?;
        self.store.transition_project(project.id, "stopping", None, None).await?;
        self.store.transition_project(project.id, "stopped", None, None).await?;
        Ok(())
    }
}

/// Idle policy: positive timeout, known last access, lapsed.
fn is_idle(project: &ProjectRecord, now: chrono::DateTime<chrono::Utc>) -> bool {
    match project.idle_deadline() {
        Some((last_accessed, timeout)) => now - last_accessed > timeout,
        None => false,
    }
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod tests;
