// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview gateway: host routing and the capability token gate.

use crate::prelude::*;
use hyper::StatusCode;
use loft_core::{ProjectStatus, UserId};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// A plain HTTP server standing in for a dev server inside the guest.
async fn spawn_dev_server() -> SocketAddr {
    let app = axum::Router::new().route(
        "/",
        axum::routing::get(|| async { "hello from upstream" }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

struct PreviewSetup {
    h: Harness,
    port: u16,
    prefix: String,
    token: String,
    api_token: String,
    id: String,
}

async fn running_project_with_dev_server() -> PreviewSetup {
    let h = Harness::spawn().await;
    let dev = spawn_dev_server().await;
    h.provider.set_endpoint("127.0.0.1", 2222, 8080);

    let user = UserId::new();
    let api_token = h.token(user);
    let project = h.create_project(&api_token, json!({ "name": "previewed" })).await;
    let id = project["id"].as_str().unwrap().to_string();
    let prefix = project["preview_prefix"].as_str().unwrap().to_string();
    let token = project["capability_token"].as_str().unwrap().to_string();

    h.request("POST", &format!("/projects/{id}/start"), Some(&api_token), None).await;
    h.wait_api_status(&api_token, &id, ProjectStatus::Running).await;

    PreviewSetup { h, port: dev.port(), prefix, token, api_token, id }
}

#[tokio::test]
async fn capability_token_gates_private_projects() {
    let s = running_project_with_dev_server().await;

    // Correct token: proxied through to the dev server.
    let host = format!("{}-{}-{}.preview.localhost", s.port, s.prefix, s.token);
    let (status, body) = s.h.preview_request(&host, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello from upstream");

    // Wrong token never reaches upstream.
    let host = format!("{}-{}-tok2.preview.localhost", s.port, s.prefix);
    let (status, _) = s.h.preview_request(&host, "/").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Missing token on a private project: same verdict.
    let host = format!("{}-{}.preview.localhost", s.port, s.prefix);
    let (status, _) = s.h.preview_request(&host, "/").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn public_projects_skip_the_token() {
    let s = running_project_with_dev_server().await;
    let (status, _) = s
        .h
        .request(
            "PATCH",
            &format!("/projects/{}", s.id),
            Some(&s.api_token),
            Some(json!({ "public": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let host = format!("{}-{}.preview.localhost", s.port, s.prefix);
    let (status, body) = s.h.preview_request(&host, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello from upstream");
}

#[tokio::test]
async fn unknown_prefix_is_404() {
    let s = running_project_with_dev_server().await;
    let host = format!("{}-00000000-{}.preview.localhost", s.port, s.token);
    let (status, _) = s.h.preview_request(&host, "/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rotated_token_invalidates_the_old_one() {
    let s = running_project_with_dev_server().await;

    let (_, rotated) = s
        .h
        .request(
            "POST",
            &format!("/projects/{}/preview-token/rotate", s.id),
            Some(&s.api_token),
            Some(json!({})),
        )
        .await;
    let new_token = rotated["capability_token"].as_str().unwrap();

    let old = format!("{}-{}-{}.preview.localhost", s.port, s.prefix, s.token);
    let (status, _) = s.h.preview_request(&old, "/").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let fresh = format!("{}-{}-{}.preview.localhost", s.port, s.prefix, new_token);
    let (status, body) = s.h.preview_request(&fresh, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello from upstream");
}

#[tokio::test]
async fn unparsable_hosts_read_as_404() {
    let s = running_project_with_dev_server().await;
    let (status, _) = s.h.preview_request("preview.localhost", "/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
