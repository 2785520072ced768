// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error surface.
//!
//! All handler errors funnel through [`ApiError`], whose `IntoResponse`
//! leaks nothing beyond the taxonomy: unknown and unowned rows are the
//! same 404, validation carries its per-field list, and everything
//! else collapses to a status with a short message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use loft_core::FieldError;
use loft_engine::EngineError;
use loft_storage::StoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, fields) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, Vec::new()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, Vec::new()),
            ApiError::Validation(fields) => (StatusCode::BAD_REQUEST, fields.clone()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, Vec::new()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, Vec::new()),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
            }
        };
        let body = ErrorBody { error: self.to_string(), fields };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::InvalidTransition { from, to } => {
                ApiError::Conflict(format!("illegal status transition: {from} -> {to}"))
            }
            StoreError::UndefinedStatus(u) => ApiError::BadRequest(u.to_string()),
            StoreError::Conflict(message) => ApiError::Conflict(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(store) => store.into(),
            EngineError::Conflict(message) => ApiError::Conflict(message),
            EngineError::Validation(fields) => ApiError::Validation(fields),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
