// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::http::StatusCode;
use loft_adapters::ProviderError;

fn status_of(e: ApiError) -> StatusCode {
    e.into_response().status()
}

#[test]
fn taxonomy_maps_to_statuses() {
    assert_eq!(status_of(ApiError::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
    assert_eq!(status_of(ApiError::Validation(Vec::new())), StatusCode::BAD_REQUEST);
    assert_eq!(status_of(ApiError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
    assert_eq!(status_of(ApiError::Conflict("x".into())), StatusCode::CONFLICT);
    assert_eq!(status_of(ApiError::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn unowned_rows_read_as_not_found() {
    // Ownership failures must be indistinguishable from missing rows.
    assert_eq!(status_of(StoreError::NotFound.into()), StatusCode::NOT_FOUND);
}

#[test]
fn illegal_transitions_conflict() {
    let err = StoreError::InvalidTransition { from: "running".into(), to: "running".into() };
    assert_eq!(status_of(err.into()), StatusCode::CONFLICT);
}

#[test]
fn undefined_status_is_bad_request() {
    let err = StoreError::UndefinedStatus(loft_core::UndefinedStatus("paused".into()));
    assert_eq!(status_of(err.into()), StatusCode::BAD_REQUEST);
}

#[test]
fn engine_errors_map_through() {
    assert_eq!(
        status_of(EngineError::Conflict("busy".into()).into()),
        StatusCode::CONFLICT
    );
    assert_eq!(status_of(EngineError::Validation(Vec::new()).into()), StatusCode::BAD_REQUEST);
    assert_eq!(
        status_of(EngineError::Store(StoreError::NotFound).into()),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status_of(EngineError::Provider(ProviderError::Fatal("x".into())).into()),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
