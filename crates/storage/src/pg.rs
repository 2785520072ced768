// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres store backend.
//!
//! Parameterized queries only; status transitions are compare-and-set in
//! a single statement so concurrent writers linearize on the database.

use crate::error::StoreError;
use crate::records::{
    InfraServiceRecord, NewInfraService, NewProject, ProjectPatch, ProjectRecord,
};
use crate::store::{project_transition_sources, service_transition_sources, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loft_core::{
    generate_capability_token, CpuClass, GpuKind, HardwareSpec, MachineId, ProjectId,
    ProjectStatus, ServiceId, ServiceStatus, UserId, UserSettings, VolumeId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

const PROJECT_COLS: &str = "id, user_id, name, description, base_image, cpu_class, cpus, \
     memory_mb, volume_size_gb, gpu_kind, machine_id, volume_id, status, error_message, \
     idle_timeout_minutes, public, capability_token, created_at, updated_at, last_accessed_at";

const SERVICE_COLS: &str = "id, project_id, service_type, name, status, machine_id, volume_id, \
     connection_details_encrypted, error_message, created_at, updated_at";

/// Postgres-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    description: Option<String>,
    base_image: String,
    cpu_class: String,
    cpus: i32,
    memory_mb: i32,
    volume_size_gb: i32,
    gpu_kind: Option<String>,
    machine_id: Option<String>,
    volume_id: Option<String>,
    status: String,
    error_message: Option<String>,
    idle_timeout_minutes: Option<i32>,
    public: bool,
    capability_token: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_accessed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProjectRow> for ProjectRecord {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self, StoreError> {
        let status: ProjectStatus = row.status.parse()?;
        let cpu_class: CpuClass =
            row.cpu_class.parse().map_err(StoreError::Corrupt)?;
        let gpu_kind = row
            .gpu_kind
            .as_deref()
            .map(str::parse::<GpuKind>)
            .transpose()
            .map_err(StoreError::Corrupt)?;
        Ok(ProjectRecord {
            id: ProjectId::from(row.id),
            user_id: UserId::from(row.user_id),
            name: row.name,
            description: row.description,
            base_image: row.base_image,
            hardware: HardwareSpec {
                cpu_class,
                cpus: row.cpus as u32,
                memory_mb: row.memory_mb as u32,
                volume_size_gb: row.volume_size_gb as u32,
                gpu_kind,
            },
            machine_id: row.machine_id.map(MachineId::from),
            volume_id: row.volume_id.map(VolumeId::from),
            status,
            error_message: row.error_message,
            idle_timeout_minutes: row.idle_timeout_minutes.map(|m| m as u32),
            public: row.public,
            capability_token: row.capability_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_accessed_at: row.last_accessed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    project_id: Uuid,
    service_type: String,
    name: String,
    status: String,
    machine_id: Option<String>,
    volume_id: Option<String>,
    connection_details_encrypted: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ServiceRow> for InfraServiceRecord {
    type Error = StoreError;

    fn try_from(row: ServiceRow) -> Result<Self, StoreError> {
        let status: ServiceStatus = row.status.parse()?;
        Ok(InfraServiceRecord {
            id: ServiceId::from(row.id),
            project_id: ProjectId::from(row.project_id),
            service_type: row.service_type,
            name: row.name,
            status,
            machine_id: row.machine_id.map(MachineId::from),
            volume_id: row.volume_id.map(VolumeId::from),
            connection_ciphertext: row.connection_details_encrypted,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_project(&self, new: NewProject) -> Result<ProjectRecord, StoreError> {
        let id = ProjectId::new();
        let token = generate_capability_token();
        let sql = format!(
            "INSERT INTO projects (id, user_id, project_prefix, name, description, base_image, \
             cpu_class, cpus, memory_mb, volume_size_gb, gpu_kind, status, \
             idle_timeout_minutes, public, capability_token) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'stopped', $12, false, $13) \
             RETURNING {PROJECT_COLS}"
        );
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id.as_uuid())
            .bind(new.user_id.as_uuid())
            .bind(id.prefix8())
            .bind(&new.name)
            .bind(&new.description)
            .bind(&new.base_image)
            .bind(new.hardware.cpu_class.to_string())
            .bind(new.hardware.cpus as i32)
            .bind(new.hardware.memory_mb as i32)
            .bind(new.hardware.volume_size_gb as i32)
            .bind(new.hardware.gpu_kind.map(|g| g.to_string()))
            .bind(new.idle_timeout_minutes.map(|m| m as i32))
            .bind(&token)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get_project_by_user(
        &self,
        id: ProjectId,
        user: UserId,
    ) -> Result<ProjectRecord, StoreError> {
        let sql = format!("SELECT {PROJECT_COLS} FROM projects WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id.as_uuid())
            .bind(user.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn get_project(&self, id: ProjectId) -> Result<ProjectRecord, StoreError> {
        let sql = format!("SELECT {PROJECT_COLS} FROM projects WHERE id = $1");
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn get_project_by_prefix(&self, prefix: &str) -> Result<ProjectRecord, StoreError> {
        let sql = format!("SELECT {PROJECT_COLS} FROM projects WHERE project_prefix = $1");
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn list_projects(&self, user: UserId) -> Result<Vec<ProjectRecord>, StoreError> {
        let sql = format!(
            "SELECT {PROJECT_COLS} FROM projects WHERE user_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_project_meta(
        &self,
        id: ProjectId,
        user: UserId,
        patch: ProjectPatch,
    ) -> Result<ProjectRecord, StoreError> {
        // $5 (cpu_class) marks whether the hardware tuple is being replaced;
        // gpu_kind follows the tuple rather than coalescing independently,
        // and a hardware patch only lands while no machine can be using
        // the current shape.
        let sql = format!(
            "UPDATE projects SET \
             name = COALESCE($3, name), \
             description = COALESCE($4, description), \
             cpu_class = COALESCE($5, cpu_class), \
             cpus = COALESCE($6, cpus), \
             memory_mb = COALESCE($7, memory_mb), \
             volume_size_gb = COALESCE($8, volume_size_gb), \
             gpu_kind = CASE WHEN $5 IS NULL THEN gpu_kind ELSE $9 END, \
             idle_timeout_minutes = COALESCE($10, idle_timeout_minutes), \
             public = COALESCE($11, public), \
             updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             AND ($5::text IS NULL OR status IN ('stopped', 'error')) \
             RETURNING {PROJECT_COLS}"
        );
        let hardware = patch.hardware;
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id.as_uuid())
            .bind(user.as_uuid())
            .bind(patch.name)
            .bind(patch.description)
            .bind(hardware.map(|h| h.cpu_class.to_string()))
            .bind(hardware.map(|h| h.cpus as i32))
            .bind(hardware.map(|h| h.memory_mb as i32))
            .bind(hardware.map(|h| h.volume_size_gb as i32))
            .bind(hardware.and_then(|h| h.gpu_kind).map(|g| g.to_string()))
            .bind(patch.idle_timeout_minutes.map(|m| m as i32))
            .bind(patch.public)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                // Distinguish a guarded hardware change from a missing or
                // unowned row.
                let status: Option<String> = sqlx::query_scalar(
                    "SELECT status FROM projects WHERE id = $1 AND user_id = $2",
                )
                .bind(id.as_uuid())
                .bind(user.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
                match status {
                    Some(_) if hardware.is_some() => Err(StoreError::Conflict(
                        "hardware changes require a stopped project".to_string(),
                    )),
                    _ => Err(StoreError::NotFound),
                }
            }
        }
    }

    async fn delete_project(&self, id: ProjectId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
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
        let sources: Vec<String> =
            project_transition_sources(to).iter().map(ToString::to_string).collect();
        let sql = format!(
            "UPDATE projects SET status = $2, \
             error_message = CASE WHEN $2 = 'error' THEN $3 ELSE NULL END, \
             machine_id = COALESCE($4, machine_id), \
             updated_at = now() \
             WHERE id = $1 AND status = ANY($5) \
             RETURNING {PROJECT_COLS}"
        );
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id.as_uuid())
            .bind(to.to_string())
            .bind(error_message)
            .bind(machine_id.map(|m| m.as_str().to_string()))
            .bind(&sources)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                let from: Option<String> =
                    sqlx::query_scalar("SELECT status FROM projects WHERE id = $1")
                        .bind(id.as_uuid())
                        .fetch_optional(&self.pool)
                        .await?;
                match from {
                    Some(from) => {
                        Err(StoreError::InvalidTransition { from, to: to.to_string() })
                    }
                    None => Err(StoreError::NotFound),
                }
            }
        }
    }

    async fn set_machine_id(&self, id: ProjectId, machine: &MachineId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE projects SET \
             updated_at = CASE WHEN machine_id IS DISTINCT FROM $2 THEN now() ELSE updated_at END, \
             machine_id = $2 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(machine.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_volume_id(&self, id: ProjectId, volume: &VolumeId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE projects SET \
             updated_at = CASE WHEN volume_id IS DISTINCT FROM $2 THEN now() ELSE updated_at END, \
             volume_id = $2 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(volume.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn bump_last_accessed(&self, id: ProjectId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE projects SET last_accessed_at = \
             GREATEST(COALESCE(last_accessed_at, 'epoch'::timestamptz), now()) \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn running_projects(&self, limit: i64) -> Result<Vec<ProjectRecord>, StoreError> {
        // Served by the partial index on status = 'running'.
        let sql = format!(
            "SELECT {PROJECT_COLS} FROM projects WHERE status = 'running' \
             ORDER BY last_accessed_at ASC NULLS FIRST LIMIT $1"
        );
        let rows = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn rotate_capability_token(
        &self,
        id: ProjectId,
        user: UserId,
    ) -> Result<String, StoreError> {
        let token = generate_capability_token();
        let updated: Option<String> = sqlx::query_scalar(
            "UPDATE projects SET capability_token = $3, updated_at = now() \
             WHERE id = $1 AND user_id = $2 RETURNING capability_token",
        )
        .bind(id.as_uuid())
        .bind(user.as_uuid())
        .bind(&token)
        .fetch_optional(&self.pool)
        .await?;
        updated.ok_or(StoreError::NotFound)
    }

    async fn mark_interrupted(&self, message: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE projects SET status = 'error', error_message = $1, updated_at = now() \
             WHERE status IN ('starting', 'stopping')",
        )
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_service(
        &self,
        new: NewInfraService,
    ) -> Result<InfraServiceRecord, StoreError> {
        let id = ServiceId::new();
        let sql = format!(
            "INSERT INTO infra_services (id, project_id, service_type, name, status) \
             VALUES ($1, $2, $3, $4, 'pending') RETURNING {SERVICE_COLS}"
        );
        let row = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(id.as_uuid())
            .bind(new.project_id.as_uuid())
            .bind(&new.service_type)
            .bind(&new.name)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get_service(
        &self,
        project: ProjectId,
        id: ServiceId,
    ) -> Result<InfraServiceRecord, StoreError> {
        let sql =
            format!("SELECT {SERVICE_COLS} FROM infra_services WHERE id = $1 AND project_id = $2");
        let row = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(id.as_uuid())
            .bind(project.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn active_service_of_type(
        &self,
        project: ProjectId,
        service_type: &str,
    ) -> Result<Option<InfraServiceRecord>, StoreError> {
        let sql = format!(
            "SELECT {SERVICE_COLS} FROM infra_services \
             WHERE project_id = $1 AND service_type = $2 \
             AND status NOT IN ('error', 'deleted') LIMIT 1"
        );
        let row = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(project.as_uuid())
            .bind(service_type)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_services(
        &self,
        project: ProjectId,
    ) -> Result<Vec<InfraServiceRecord>, StoreError> {
        let sql = format!(
            "SELECT {SERVICE_COLS} FROM infra_services \
             WHERE project_id = $1 AND status != 'deleted' ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(project.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn transition_service(
        &self,
        id: ServiceId,
        to_status: &str,
        error_message: Option<&str>,
    ) -> Result<InfraServiceRecord, StoreError> {
        let to: ServiceStatus = to_status.parse()?;
        let sources: Vec<String> =
            service_transition_sources(to).iter().map(ToString::to_string).collect();
        let sql = format!(
            "UPDATE infra_services SET status = $2, \
             error_message = CASE WHEN $2 = 'error' THEN $3 ELSE NULL END, \
             updated_at = now() \
             WHERE id = $1 AND status = ANY($4) \
             RETURNING {SERVICE_COLS}"
        );
        let row = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(id.as_uuid())
            .bind(to.to_string())
            .bind(error_message)
            .bind(&sources)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                let from: Option<String> =
                    sqlx::query_scalar("SELECT status FROM infra_services WHERE id = $1")
                        .bind(id.as_uuid())
                        .fetch_optional(&self.pool)
                        .await?;
                match from {
                    Some(from) => {
                        Err(StoreError::InvalidTransition { from, to: to.to_string() })
                    }
                    None => Err(StoreError::NotFound),
                }
            }
        }
    }

    async fn set_service_ready(
        &self,
        id: ServiceId,
        connection_ciphertext: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE infra_services SET status = 'ready', \
             connection_details_encrypted = $2, error_message = NULL, updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.as_uuid())
        .bind(connection_ciphertext)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            let from: Option<String> =
                sqlx::query_scalar("SELECT status FROM infra_services WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;
            return match from {
                Some(from) => Err(StoreError::InvalidTransition {
                    from,
                    to: ServiceStatus::Ready.to_string(),
                }),
                None => Err(StoreError::NotFound),
            };
        }
        Ok(())
    }

    async fn set_service_machine_id(
        &self,
        id: ServiceId,
        machine: &MachineId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE infra_services SET \
             updated_at = CASE WHEN machine_id IS DISTINCT FROM $2 THEN now() ELSE updated_at END, \
             machine_id = $2 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(machine.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_user_settings(&self, user: UserId) -> Result<Option<UserSettings>, StoreError> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT settings_json FROM user_settings WHERE user_id = $1")
                .bind(user.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from)).transpose()
    }

    async fn put_user_settings(
        &self,
        user: UserId,
        settings: &UserSettings,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(settings)?;
        sqlx::query(
            "INSERT INTO user_settings (user_id, settings_json) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET settings_json = $2, updated_at = now()",
        )
        .bind(user.as_uuid())
        .bind(&json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_api_keys_ciphertext(&self, user: UserId) -> Result<Option<String>, StoreError> {
        let ciphertext: Option<String> =
            sqlx::query_scalar("SELECT ciphertext FROM user_api_keys WHERE user_id = $1")
                .bind(user.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(ciphertext)
    }

    async fn put_api_keys_ciphertext(
        &self,
        user: UserId,
        ciphertext: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_api_keys (user_id, ciphertext) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET ciphertext = $2, updated_at = now()",
        )
        .bind(user.as_uuid())
        .bind(ciphertext)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
