// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project lifecycle manager.
//!
//! Request handlers flip the synchronous status edge (`stopped/error →
//! starting`, `running → stopping`) and return immediately; a detached
//! worker drives the provider and lands the outcome edge. Workers never
//! retry; a failure records `error` with the provider's message and the
//! user retries explicitly.

use crate::error::EngineError;
use crate::keys;
use crate::vault::Vault;
use loft_adapters::{MachineConfig, MachineProvider, VolumeConfig};
use loft_core::{AgentEnv, Clock, Correlation, MachineState, ProjectId, ProjectStatus, UserId};
use loft_storage::{ProjectRecord, Store};
use std::sync::Arc;
use std::time::Duration;

/// Operator configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Guest image used when a project does not override it.
    pub base_image: String,
    /// Region for machines and volumes without an accelerator.
    pub default_region: String,
    /// Prefix for provider-visible machine/volume names.
    pub machine_name_prefix: String,
    /// Platform key exported to agents (user keys override it).
    pub platform_api_key: Option<String>,
    /// Budget for `WaitForState(started)` in the start worker.
    pub start_timeout: Duration,
    /// Budget for `WaitForState(stopped)` in the stop worker.
    pub stop_timeout: Duration,
    /// Idle sweeper tick interval.
    pub sweep_interval: Duration,
    /// Page size for the sweeper's running-projects query.
    pub sweep_page_size: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_image: "loft-base:latest".to_string(),
            default_region: "sjc".to_string(),
            machine_name_prefix: "loft".to_string(),
            platform_api_key: None,
            start_timeout: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            sweep_page_size: 100,
        }
    }
}

/// The lifecycle manager. Cheap to clone; workers carry a clone so an
/// HTTP client disconnect never aborts provisioning.
#[derive(Clone)]
pub struct Lifecycle<C: Clock> {
    store: Arc<dyn Store>,
    provider: Arc<dyn MachineProvider>,
    vault: Arc<Vault>,
    config: Arc<EngineConfig>,
    clock: C,
}

impl<C: Clock> Lifecycle<C> {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn MachineProvider>,
        vault: Arc<Vault>,
        config: Arc<EngineConfig>,
        clock: C,
    ) -> Self {
        Self { store, provider, vault, config, clock }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn MachineProvider> {
        &self.provider
    }

    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Boot-time recovery: rows left in `starting`/`stopping` by a dead
    /// process become `error`, which the next Start flips back through
    /// `starting`. Provider state is not reconciled here; that is an
    /// operator concern.
    pub async fn recover_interrupted(&self) -> Result<u64, EngineError> {
        let flipped =
            self.store.mark_interrupted("interrupted by control plane restart").await?;
        if flipped > 0 {
            tracing::warn!(flipped, "marked orphaned in-flight projects as error");
        }
        Ok(flipped)
    }

    /// Accept a start request: verify ownership, require a startable
    /// state, flip to `starting`, and hand off to the async worker.
    pub async fn start(&self, id: ProjectId, user: UserId) -> Result<ProjectRecord, EngineError> {
        let project = self.store.get_project_by_user(id, user).await?;
        if !project.status.startable() {
            return Err(EngineError::Conflict(format!("project is {}", project.status)));
        }

        let record = self.store.transition_project(id, "starting", None, None).await?;

        let worker = self.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.start_worker(id).await {
                tracing::error!(project_id = %id, error = %e, "start worker failed");
                worker.record_failure(id, &e).await;
            }
        });

        Ok(record)
    }

    /// Accept a stop request and hand off to the async worker.
    pub async fn stop(&self, id: ProjectId, user: UserId) -> Result<ProjectRecord, EngineError> {
        let project = self.store.get_project_by_user(id, user).await?;
        if project.status != ProjectStatus::Running {
            return Err(EngineError::Conflict(format!("project is {}", project.status)));
        }

        let record = self.store.transition_project(id, "stopping", None, None).await?;

        let worker = self.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.stop_worker(id).await {
                tracing::error!(project_id = %id, error = %e, "stop worker failed");
                worker.record_failure(id, &e).await;
            }
        });

        Ok(record)
    }

    /// Delete the project. Provider teardown is attempted first but never
    /// blocks row removal. The database is the source of truth, and
    /// orphaned provider objects are reconciled out of band.
    pub async fn delete(&self, id: ProjectId, user: UserId) -> Result<(), EngineError> {
        let project = self.store.get_project_by_user(id, user).await?;

        if let Some(machine) = &project.machine_id {
            if let Err(e) = self.provider.delete_machine(machine).await {
                tracing::warn!(project_id = %id, machine_id = %machine, error = %e,
                    "machine delete failed, removing row anyway");
            }
        }
        if let Some(volume) = &project.volume_id {
            if let Err(e) = self.provider.delete_volume(volume).await {
                tracing::warn!(project_id = %id, volume_id = %volume, error = %e,
                    "volume delete failed, removing row anyway");
            }
        }

        self.store.delete_project(id).await?;
        tracing::info!(project_id = %id, "project deleted");
        Ok(())
    }

    /// Assemble the agent environment for a project's guest. The
    /// correlation trio rides along when a request context is available
    /// (bridge dials); workers pass `None`.
    pub async fn agent_env(
        &self,
        project: &ProjectRecord,
        correlation: Option<Correlation>,
    ) -> Result<AgentEnv, EngineError> {
        let user_keys =
            keys::env_pairs(self.store.as_ref(), &self.vault, project.user_id).await?;
        let mut builder = AgentEnv::builder(project.id).user_keys(user_keys);
        if let Some(key) = &self.config.platform_api_key {
            builder = builder.platform_key(key.clone());
        }
        if let Some(correlation) = correlation {
            builder = builder.correlation(correlation);
        }
        Ok(builder.build())
    }

    async fn start_worker(&self, id: ProjectId) -> Result<(), EngineError> {
        let project = self.store.get_project(id).await?;
        let region = project.hardware.region(&self.config.default_region).to_string();

        // 1. Volume: created once, bound for the life of the project.
        let volume = match project.volume_id.clone() {
            Some(volume) => volume,
            None => {
                let volume = self
                    .provider
                    .create_volume(VolumeConfig {
                        name: self.object_name(&project),
                        size_gb: project.hardware.volume_size_gb,
                        region: region.clone(),
                    })
                    .await?;
                self.store.set_volume_id(id, &volume).await?;
                tracing::info!(project_id = %id, volume_id = %volume, "volume created");
                volume
            }
        };

        // 2./3. Machine: create on first start, plain start afterwards.
        let machine_id = match project.machine_id.clone() {
            Some(machine) => {
                self.provider.start_machine(&machine).await?;
                machine
            }
            None => {
                let env = self.agent_env(&project, None).await?;
                let config = MachineConfig::new(
                    self.object_name(&project),
                    project.base_image.clone(),
                    project.hardware,
                )
                .region(region)
                .env(env.to_pairs())
                .volume(volume);
                let machine = self.provider.create_machine(config).await?;
                self.store.set_machine_id(id, &machine.id).await?;
                tracing::info!(project_id = %id, machine_id = %machine.id, "machine created");
                machine.id
            }
        };

        // 4. Wait for the guest, then land the outcome edge.
        self.provider
            .wait_for_state(&machine_id, MachineState::Started, self.config.start_timeout)
            .await?;
        self.store
            .transition_project(id, "running", None, Some(&machine_id))
            .await?;
        self.store.bump_last_accessed(id).await?;
        tracing::info!(project_id = %id, machine_id = %machine_id, "project running");
        Ok(())
    }

    async fn stop_worker(&self, id: ProjectId) -> Result<(), EngineError> {
        let project = self.store.get_project(id).await?;

        if let Some(machine) = project.machine_id {
            self.provider.stop_machine(&machine).await?;
            self.provider
                .wait_for_state(&machine, MachineState::Stopped, self.config.stop_timeout)
                .await?;
        }

        self.store.transition_project(id, "stopped", None, None).await?;
        tracing::info!(project_id = %id, "project stopped");
        Ok(())
    }

    /// Record a worker failure as `status = error`. No retries happen
    /// here; the user retries explicitly.
    async fn record_failure(&self, id: ProjectId, error: &EngineError) {
        let message = error.to_string();
        if let Err(e) = self.store.transition_project(id, "error", Some(&message), None).await {
            tracing::warn!(project_id = %id, error = %e, "could not record error status");
        }
    }

    fn object_name(&self, project: &ProjectRecord) -> String {
        format!("{}-{}", self.config.machine_name_prefix, project.id.prefix8())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
