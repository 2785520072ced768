// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auxiliary infra endpoints.

use crate::auth::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use loft_core::{ProjectId, ServiceId, ServiceStatus};
use loft_engine::ConnectionDetails;
use loft_storage::InfraServiceRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub service_type: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    pub id: ServiceId,
    pub service_type: String,
    pub name: String,
    pub status: ServiceStatus,
    pub error_message: Option<String>,
    /// Present only once the service is ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceResponse {
    fn new(record: InfraServiceRecord, connection: Option<ConnectionDetails>) -> Self {
        Self {
            id: record.id,
            service_type: record.service_type,
            name: record.name,
            status: record.status,
            error_message: record.error_message,
            connection,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

pub async fn provision(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
    Json(req): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<ServiceResponse>), ApiError> {
    let project = state.store.get_project_by_user(id, ctx.user).await?;
    // External callers get a 409 on duplicates.
    let record = state.infra.provision(&project, &req.service_type, false).await?;
    Ok((StatusCode::ACCEPTED, Json(ServiceResponse::new(record, None))))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<ProjectId>,
) -> Result<Json<Vec<ServiceResponse>>, ApiError> {
    let project = state.store.get_project_by_user(id, ctx.user).await?;
    let records = state.infra.list(project.id).await?;
    let mut services = Vec::with_capacity(records.len());
    for record in records {
        let connection = state.infra.connection(&record)?;
        services.push(ServiceResponse::new(record, connection));
    }
    Ok(Json(services))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, service_id)): Path<(ProjectId, ServiceId)>,
) -> Result<StatusCode, ApiError> {
    let project = state.store.get_project_by_user(id, ctx.user).await?;
    state.infra.delete(project.id, service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
