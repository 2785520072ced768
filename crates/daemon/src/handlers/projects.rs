// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project CRUD and lifecycle endpoints.
//!
//! User-settings defaults are applied here, never inside the engine:
//! a create request missing hardware or an idle timeout inherits the
//! user's defaults before the record is written.

use crate::auth::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use loft_core::{
    FieldError, HardwareSpec, MachineId, ProjectId, ProjectStatus, VolumeId,
};
use loft_storage::{NewProject, ProjectPatch, ProjectRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub base_image: Option<String>,
    /// Named hardware preset; ignored when `hardware` is explicit.
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub hardware: Option<HardwareSpec>,
    #[serde(default)]
    pub idle_timeout_minutes: Option<u32>,
}

/// Wire shape of a project. The capability token is included: it is the
/// owner's own credential for preview links.
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub base_image: String,
    #[serde(flatten)]
    pub hardware: HardwareSpec,
    pub machine_id: Option<MachineId>,
    pub volume_id: Option<VolumeId>,
    pub status: ProjectStatus,
    pub error_message: Option<String>,
    pub idle_timeout_minutes: Option<u32>,
    pub public: bool,
    pub capability_token: String,
    pub preview_prefix: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl From<ProjectRecord> for ProjectResponse {
    fn from(record: ProjectRecord) -> Self {
        Self {
            preview_prefix: record.id.prefix8(),
            id: record.id,
            name: record.name,
            description: record.description,
            base_image: record.base_image,
            hardware: record.hardware,
            machine_id: record.machine_id,
            volume_id: record.volume_id,
            status: record.status,
            error_message: record.error_message,
            idle_timeout_minutes: record.idle_timeout_minutes,
            public: record.public,
            capability_token: record.capability_token,
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_accessed_at: record.last_accessed_at,
        }
    }
}

/// 202 body for start/stop.
#[derive(Debug, Serialize)]
pub struct LifecycleAccepted {
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub capability_token: String,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    let projects = state.store.list_projects(ctx.user).await?;
    Ok(Json(projects.into_iter().map(Into::into).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let settings = state.store.get_user_settings(ctx.user).await?.unwrap_or_default();
    let mut errors = Vec::new();

    let name = req.name.trim().to_string();
    if name.is_empty() {
        errors.push(FieldError::new("name", "must not be empty"));
    } else if name.len() > 100 {
        errors.push(FieldError::new("name", "must be at most 100 characters"));
    }

    let hardware = match (req.hardware, req.preset.as_deref()) {
        (Some(hardware), _) => hardware,
        (None, Some(preset)) => match HardwareSpec::preset(preset) {
            Some(hardware) => hardware,
            None => {
                errors.push(FieldError::new("preset", format!("unknown preset {preset:?}")));
                settings.default_hardware
            }
        },
        (None, None) => settings.default_hardware,
    };
    if let Err(hardware_errors) = hardware.validate() {
        errors.extend(hardware_errors);
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let record = state
        .store
        .create_project(NewProject {
            user_id: ctx.user,
            name,
            description: req.description,
            base_image: req.base_image.unwrap_or_else(|| state.config.base_image.clone()),
            hardware,
            idle_timeout_minutes: req
                .idle_timeout_minutes
                .or(settings.default_idle_timeout_minutes),
        })
        .await?;
    tracing::info!(project_id = %record.id, "project created");
    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let record = state.store.get_project_by_user(id, ctx.user).await?;
    Ok(Json(record.into()))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let current = state.store.get_project_by_user(id, ctx.user).await?;

    if let Some(hardware) = &patch.hardware {
        // Hardware only changes while no machine can be using it.
        if !matches!(current.status, ProjectStatus::Stopped | ProjectStatus::Error) {
            return Err(ApiError::Conflict(format!(
                "stop the project to change hardware (currently {})",
                current.status
            )));
        }
        if let Err(errors) = hardware.validate() {
            return Err(ApiError::Validation(errors));
        }
    }
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation(vec![FieldError::new("name", "must not be empty")]));
        }
    }

    let record = state.store.update_project_meta(id, ctx.user, patch).await?;
    Ok(Json(record.into()))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.delete(id, ctx.user).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
) -> Result<(StatusCode, Json<LifecycleAccepted>), ApiError> {
    let record = state.lifecycle.start(id, ctx.user).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(LifecycleAccepted {
            status: record.status,
            terminal_url: Some(state.config.terminal_url(id)),
        }),
    ))
}

pub async fn stop(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
) -> Result<(StatusCode, Json<LifecycleAccepted>), ApiError> {
    let record = state.lifecycle.stop(id, ctx.user).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(LifecycleAccepted { status: record.status, terminal_url: None }),
    ))
}

pub async fn rotate_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
) -> Result<Json<TokenResponse>, ApiError> {
    let capability_token = state.store.rotate_capability_token(id, ctx.user).await?;
    Ok(Json(TokenResponse { capability_token }))
}
