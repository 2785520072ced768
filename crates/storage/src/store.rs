// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store contract.

use crate::error::StoreError;
use crate::records::{
    InfraServiceRecord, NewInfraService, NewProject, ProjectPatch, ProjectRecord,
};
use async_trait::async_trait;
use loft_core::{MachineId, ProjectId, ServiceId, UserId, UserSettings, VolumeId};

/// Persistence operations over projects, infra services, user settings,
/// and API-key ciphertext.
///
/// Backends are swapped at process start; everything above holds an
/// `Arc<dyn Store>`. Conventions shared by all implementations:
///
/// - Reads exposed to an end user take `(id, user)` and return
///   [`StoreError::NotFound`] whether the row is missing or merely
///   unowned.
/// - Status writes take the status as a string, refuse undefined values,
///   and reject transitions outside the state machine. The transition is
///   a single statement: a concurrent writer observes either the old or
///   the new row, never a half-applied one.
/// - Machine/volume id setters are idempotent: writing the value already
///   stored is a no-op.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // -- projects --------------------------------------------------------

    async fn create_project(&self, new: NewProject) -> Result<ProjectRecord, StoreError>;

    /// Owner-scoped read; 404-on-unowned.
    async fn get_project_by_user(
        &self,
        id: ProjectId,
        user: UserId,
    ) -> Result<ProjectRecord, StoreError>;

    /// Unscoped read for internal callers (workers, resolver, sweeper).
    async fn get_project(&self, id: ProjectId) -> Result<ProjectRecord, StoreError>;

    /// Gateway lookup by the first 8 hex chars of the id.
    async fn get_project_by_prefix(&self, prefix: &str) -> Result<ProjectRecord, StoreError>;

    async fn list_projects(&self, user: UserId) -> Result<Vec<ProjectRecord>, StoreError>;

    /// Apply a metadata patch. A patch that replaces the hardware tuple
    /// is refused unless the project is `stopped` or `error`, regardless
    /// of caller; a machine may be using the current shape otherwise.
    async fn update_project_meta(
        &self,
        id: ProjectId,
        user: UserId,
        patch: ProjectPatch,
    ) -> Result<ProjectRecord, StoreError>;

    /// Remove the row. The caller is responsible for provider teardown;
    /// the database is the source of truth and never blocks on it.
    async fn delete_project(&self, id: ProjectId) -> Result<(), StoreError>;

    /// Atomically move `status` along a legal edge, recording the error
    /// message (cleared on non-error states) and optionally the machine id
    /// in the same statement.
    async fn transition_project(
        &self,
        id: ProjectId,
        to_status: &str,
        error_message: Option<&str>,
        machine_id: Option<&MachineId>,
    ) -> Result<ProjectRecord, StoreError>;

    async fn set_machine_id(&self, id: ProjectId, machine: &MachineId) -> Result<(), StoreError>;

    async fn set_volume_id(&self, id: ProjectId, volume: &VolumeId) -> Result<(), StoreError>;

    /// Monotonic bump; callers debounce.
    async fn bump_last_accessed(&self, id: ProjectId) -> Result<(), StoreError>;

    /// Running projects for the idle sweeper, oldest-accessed first,
    /// bounded by `limit`. Never scans stopped rows.
    async fn running_projects(&self, limit: i64) -> Result<Vec<ProjectRecord>, StoreError>;

    /// Replace the capability token; returns the new token.
    async fn rotate_capability_token(
        &self,
        id: ProjectId,
        user: UserId,
    ) -> Result<String, StoreError>;

    /// Flip every `starting`/`stopping` row to `error` with `message`.
    /// Run once at boot: those rows belonged to workers that died with
    /// the previous process, and `error` is the state the next Start
    /// recovers from. Returns how many rows were flipped.
    async fn mark_interrupted(&self, message: &str) -> Result<u64, StoreError>;

    // -- infra services --------------------------------------------------

    /// Insert as `pending`.
    async fn create_service(
        &self,
        new: NewInfraService,
    ) -> Result<InfraServiceRecord, StoreError>;

    async fn get_service(
        &self,
        project: ProjectId,
        id: ServiceId,
    ) -> Result<InfraServiceRecord, StoreError>;

    /// The service occupying `service_type` for dedup purposes, i.e. one
    /// whose status is neither `error` nor `deleted`.
    async fn active_service_of_type(
        &self,
        project: ProjectId,
        service_type: &str,
    ) -> Result<Option<InfraServiceRecord>, StoreError>;

    async fn list_services(
        &self,
        project: ProjectId,
    ) -> Result<Vec<InfraServiceRecord>, StoreError>;

    async fn transition_service(
        &self,
        id: ServiceId,
        to_status: &str,
        error_message: Option<&str>,
    ) -> Result<InfraServiceRecord, StoreError>;

    /// `pending → ready` plus the connection ciphertext, one statement.
    async fn set_service_ready(
        &self,
        id: ServiceId,
        connection_ciphertext: &str,
    ) -> Result<(), StoreError>;

    async fn set_service_machine_id(
        &self,
        id: ServiceId,
        machine: &MachineId,
    ) -> Result<(), StoreError>;

    // -- user settings and API keys --------------------------------------

    async fn get_user_settings(&self, user: UserId) -> Result<Option<UserSettings>, StoreError>;

    async fn put_user_settings(
        &self,
        user: UserId,
        settings: &UserSettings,
    ) -> Result<(), StoreError>;

    /// AEAD ciphertext of the user's provider→key map, opaque here.
    async fn get_api_keys_ciphertext(&self, user: UserId) -> Result<Option<String>, StoreError>;

    async fn put_api_keys_ciphertext(
        &self,
        user: UserId,
        ciphertext: &str,
    ) -> Result<(), StoreError>;
}

/// Legal source states for a project transition into `to`.
pub(crate) fn project_transition_sources(
    to: loft_core::ProjectStatus,
) -> &'static [loft_core::ProjectStatus] {
    use loft_core::ProjectStatus::*;
    match to {
        Starting => &[Stopped, Error],
        Running => &[Starting],
        Stopping => &[Running],
        Stopped => &[Stopping],
        Error => &[Starting, Running, Stopping],
    }
}

/// Legal source states for a service transition into `to`.
pub(crate) fn service_transition_sources(
    to: loft_core::ServiceStatus,
) -> &'static [loft_core::ServiceStatus] {
    use loft_core::ServiceStatus::*;
    match to {
        Pending => &[],
        Ready => &[Pending],
        Error => &[Pending, Ready],
        Deleted => &[Pending, Ready, Error],
    }
}
