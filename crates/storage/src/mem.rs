// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store backend.
//!
//! Single-process substitute for Postgres: tests and `--store memory`
//! runs. Shares the Postgres backend's semantics exactly: ownership
//! collapses to `NotFound`, undefined statuses are refused, transitions
//! follow the state machine. Everything above can be exercised
//! without a database.

use crate::error::StoreError;
use crate::records::{
    InfraServiceRecord, NewInfraService, NewProject, ProjectPatch, ProjectRecord,
};
use crate::store::{project_transition_sources, service_transition_sources, Store};
use async_trait::async_trait;
use chrono::Utc;
use loft_core::{
    generate_capability_token, MachineId, ProjectId, ProjectStatus, ServiceId, ServiceStatus,
    UserId, UserSettings, VolumeId,
};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    projects: HashMap<ProjectId, ProjectRecord>,
    services: HashMap<ServiceId, InfraServiceRecord>,
    settings: HashMap<UserId, UserSettings>,
    api_keys: HashMap<UserId, String>,
}

/// In-process [`Store`] over parking_lot-guarded maps.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn create_project(&self, new: NewProject) -> Result<ProjectRecord, StoreError> {
        let now = Utc::now();
        let record = ProjectRecord {
            id: ProjectId::new(),
            user_id: new.user_id,
            name: new.name,
            description: new.description,
            base_image: new.base_image,
            hardware: new.hardware,
            machine_id: None,
            volume_id: None,
            status: ProjectStatus::Stopped,
            error_message: None,
            idle_timeout_minutes: new.idle_timeout_minutes,
            public: false,
            capability_token: generate_capability_token(),
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
        };
        self.inner.write().projects.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_project_by_user(
        &self,
        id: ProjectId,
        user: UserId,
    ) -> Result<ProjectRecord, StoreError> {
        let inner = self.inner.read();
        inner
            .projects
            .get(&id)
            .filter(|p| p.user_id == user)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_project(&self, id: ProjectId) -> Result<ProjectRecord, StoreError> {
        self.inner.read().projects.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_project_by_prefix(&self, prefix: &str) -> Result<ProjectRecord, StoreError> {
        let inner = self.inner.read();
        inner
            .projects
            .values()
            .find(|p| p.id.prefix8() == prefix)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_projects(&self, user: UserId) -> Result<Vec<ProjectRecord>, StoreError> {
        let inner = self.inner.read();
        let mut projects: Vec<_> =
            inner.projects.values().filter(|p| p.user_id == user).cloned().collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }

    async fn update_project_meta(
        &self,
        id: ProjectId,
        user: UserId,
        patch: ProjectPatch,
    ) -> Result<ProjectRecord, StoreError> {
        let mut inner = self.inner.write();
        let record = inner
            .projects
            .get_mut(&id)
            .filter(|p| p.user_id == user)
            .ok_or(StoreError::NotFound)?;
        if patch.hardware.is_some()
            && !matches!(record.status, ProjectStatus::Stopped | ProjectStatus::Error)
        {
            return Err(StoreError::Conflict(
                "hardware changes require a stopped project".to_string(),
            ));
        }
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(description) = patch.description {
            record.description = Some(description);
        }
        if let Some(hardware) = patch.hardware {
            record.hardware = hardware;
        }
        if let Some(minutes) = patch.idle_timeout_minutes {
            record.idle_timeout_minutes = Some(minutes);
        }
        if let Some(public) = patch.public {
            record.public = public;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete_project(&self, id: ProjectId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.projects.remove(&id).ok_or(StoreError::NotFound)?;
        inner.services.retain(|_, s| s.project_id != id);
        Ok(())
    }

    async fn transition_project(
        &self,
        id: ProjectId,
        to_status: &str,
        error_message: Option<&str>,
        machine_id: Option<&MachineId>,
    ) -> Result<ProjectRecord, StoreError> {
        let to: ProjectStatus = to_status.parse()?;
        let mut inner = self.inner.write();
        let record = inner.projects.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !project_transition_sources(to).contains(&record.status) {
            return Err(StoreError::InvalidTransition {
                from: record.status.to_string(),
                to: to.to_string(),
            });
        }
        record.status = to;
        record.error_message = if to == ProjectStatus::Error {
            error_message.map(str::to_string)
        } else {
            None
        };
        if let Some(machine) = machine_id {
            record.machine_id = Some(machine.clone());
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn set_machine_id(&self, id: ProjectId, machine: &MachineId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner.projects.get_mut(&id).ok_or(StoreError::NotFound)?;
        if record.machine_id.as_ref() != Some(machine) {
            record.machine_id = Some(machine.clone());
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_volume_id(&self, id: ProjectId, volume: &VolumeId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner.projects.get_mut(&id).ok_or(StoreError::NotFound)?;
        if record.volume_id.as_ref() != Some(volume) {
            record.volume_id = Some(volume.clone());
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn bump_last_accessed(&self, id: ProjectId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner.projects.get_mut(&id).ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        // Monotonic: never move backwards.
        if record.last_accessed_at.map_or(true, |prev| prev < now) {
            record.last_accessed_at = Some(now);
        }
        Ok(())
    }

    async fn running_projects(&self, limit: i64) -> Result<Vec<ProjectRecord>, StoreError> {
        let inner = self.inner.read();
        let mut running: Vec<_> = inner
            .projects
            .values()
            .filter(|p| p.status == ProjectStatus::Running)
            .cloned()
            .collect();
        running.sort_by_key(|p| p.last_accessed_at);
        running.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(running)
    }

    async fn rotate_capability_token(
        &self,
        id: ProjectId,
        user: UserId,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.write();
        let record = inner
            .projects
            .get_mut(&id)
            .filter(|p| p.user_id == user)
            .ok_or(StoreError::NotFound)?;
        record.capability_token = generate_capability_token();
        record.updated_at = Utc::now();
        Ok(record.capability_token.clone())
    }

    async fn mark_interrupted(&self, message: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.write();
        let mut flipped = 0;
        for record in inner.projects.values_mut() {
            if matches!(record.status, ProjectStatus::Starting | ProjectStatus::Stopping) {
                record.status = ProjectStatus::Error;
                record.error_message = Some(message.to_string());
                record.updated_at = Utc::now();
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn create_service(
        &self,
        new: NewInfraService,
    ) -> Result<InfraServiceRecord, StoreError> {
        let now = Utc::now();
        let record = InfraServiceRecord {
            id: ServiceId::new(),
            project_id: new.project_id,
            service_type: new.service_type,
            name: new.name,
            status: ServiceStatus::Pending,
            machine_id: None,
            volume_id: None,
            connection_ciphertext: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.write().services.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_service(
        &self,
        project: ProjectId,
        id: ServiceId,
    ) -> Result<InfraServiceRecord, StoreError> {
        let inner = self.inner.read();
        inner
            .services
            .get(&id)
            .filter(|s| s.project_id == project)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn active_service_of_type(
        &self,
        project: ProjectId,
        service_type: &str,
    ) -> Result<Option<InfraServiceRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .services
            .values()
            .find(|s| {
                s.project_id == project
                    && s.service_type == service_type
                    && s.status.occupies_type()
            })
            .cloned())
    }

    async fn list_services(
        &self,
        project: ProjectId,
    ) -> Result<Vec<InfraServiceRecord>, StoreError> {
        let inner = self.inner.read();
        let mut services: Vec<_> = inner
            .services
            .values()
            .filter(|s| s.project_id == project && s.status != ServiceStatus::Deleted)
            .cloned()
            .collect();
        services.sort_by_key(|s| s.created_at);
        Ok(services)
    }

    async fn transition_service(
        &self,
        id: ServiceId,
        to_status: &str,
        error_message: Option<&str>,
    ) -> Result<InfraServiceRecord, StoreError> {
        let to: ServiceStatus = to_status.parse()?;
        let mut inner = self.inner.write();
        let record = inner.services.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !service_transition_sources(to).contains(&record.status) {
            return Err(StoreError::InvalidTransition {
                from: record.status.to_string(),
                to: to.to_string(),
            });
        }
        record.status = to;
        record.error_message = if to == ServiceStatus::Error {
            error_message.map(str::to_string)
        } else {
            None
        };
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn set_service_ready(
        &self,
        id: ServiceId,
        connection_ciphertext: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner.services.get_mut(&id).ok_or(StoreError::NotFound)?;
        if record.status != ServiceStatus::Pending {
            return Err(StoreError::InvalidTransition {
                from: record.status.to_string(),
                to: ServiceStatus::Ready.to_string(),
            });
        }
        record.status = ServiceStatus::Ready;
        record.connection_ciphertext = Some(connection_ciphertext.to_string());
        record.error_message = None;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_service_machine_id(
        &self,
        id: ServiceId,
        machine: &MachineId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner.services.get_mut(&id).ok_or(StoreError::NotFound)?;
        if record.machine_id.as_ref() != Some(machine) {
            record.machine_id = Some(machine.clone());
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_user_settings(&self, user: UserId) -> Result<Option<UserSettings>, StoreError> {
        Ok(self.inner.read().settings.get(&user).cloned())
    }

    async fn put_user_settings(
        &self,
        user: UserId,
        settings: &UserSettings,
    ) -> Result<(), StoreError> {
        self.inner.write().settings.insert(user, settings.clone());
        Ok(())
    }

    async fn get_api_keys_ciphertext(&self, user: UserId) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().api_keys.get(&user).cloned())
    }

    async fn put_api_keys_ciphertext(
        &self,
        user: UserId,
        ciphertext: &str,
    ) -> Result<(), StoreError> {
        self.inner.write().api_keys.insert(user, ciphertext.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
