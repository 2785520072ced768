// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API router assembly.

use crate::handlers::{infra, projects, settings};
use crate::state::AppState;
use crate::{auth, bridge};
use axum::routing::{delete, get, post};
use axum::{middleware, Json, Router};
use tower_http::trace::TraceLayer;

/// Authenticated API surface plus the unauthenticated health probe.
pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/projects", get(projects::list).post(projects::create))
        .route(
            "/projects/:id",
            get(projects::get_one).patch(projects::update).delete(projects::remove),
        )
        .route("/projects/:id/start", post(projects::start))
        .route("/projects/:id/stop", post(projects::stop))
        .route("/projects/:id/workspace", get(bridge::workspace))
        .route("/projects/:id/preview-token/rotate", post(projects::rotate_token))
        .route("/projects/:id/infra", get(infra::list).post(infra::provision))
        .route("/projects/:id/infra/:service_id", delete(infra::remove))
        .route("/settings", get(settings::get_settings).put(settings::put_settings))
        .route(
            "/settings/api-keys",
            get(settings::list_api_keys).put(settings::put_api_keys),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth::middleware));

    Router::new()
        .merge(authed)
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
