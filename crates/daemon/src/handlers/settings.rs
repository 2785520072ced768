// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User settings and the API-key vault.
//!
//! Keys go in as plaintext over the authenticated channel, are encrypted
//! under the user's scope, and never come back out. Reads surface
//! provider names and timestamps only.

use crate::auth::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use loft_core::{FieldError, UserSettings};
use loft_engine::keys;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<UserSettings>, ApiError> {
    let settings = state.store.get_user_settings(ctx.user).await?.unwrap_or_default();
    Ok(Json(settings))
}

pub async fn put_settings(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(settings): Json<UserSettings>,
) -> Result<Json<UserSettings>, ApiError> {
    if let Err(errors) = settings.default_hardware.validate() {
        return Err(ApiError::Validation(errors));
    }
    state.store.put_user_settings(ctx.user, &settings).await?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
pub struct PutApiKeysRequest(pub BTreeMap<String, String>);

#[derive(Debug, Serialize)]
pub struct ApiKeyInfo {
    pub provider: String,
    pub added_at: DateTime<Utc>,
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Vec<ApiKeyInfo>>, ApiError> {
    let Some(ciphertext) = state.store.get_api_keys_ciphertext(ctx.user).await? else {
        return Ok(Json(Vec::new()));
    };
    let map = keys::decrypt_map(&state.vault, ctx.user, &ciphertext)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(
        map.into_iter()
            .map(|(provider, entry)| ApiKeyInfo { provider, added_at: entry.added_at })
            .collect(),
    ))
}

pub async fn put_api_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<PutApiKeysRequest>,
) -> Result<StatusCode, ApiError> {
    let errors: Vec<FieldError> = req
        .0
        .keys()
        .filter(|provider| keys::env_name(provider).is_none())
        .map(|provider| FieldError::new(provider.clone(), "unknown provider"))
        .collect();
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let now = Utc::now();
    let map: keys::ApiKeyMap = req
        .0
        .into_iter()
        .map(|(provider, key)| (provider, keys::StoredApiKey { key, added_at: now }))
        .collect();
    let ciphertext = keys::encrypt_map(&state.vault, ctx.user, &map)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    state.store.put_api_keys_ciphertext(ctx.user, &ciphertext).await?;
    Ok(StatusCode::NO_CONTENT)
}
