// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrent workspace sessions.

use crate::prelude::*;
use futures_util::SinkExt;
use hyper::StatusCode;
use loft_core::{ProjectStatus, UserId};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn two_sessions_forward_independently() {
    let h = Harness::spawn().await;
    let upstream = spawn_echo_upstream().await;
    h.provider.set_endpoint("127.0.0.1", 2222, upstream.addr.port());

    let user = UserId::new();
    let token = h.token(user);
    let project = h.create_project(&token, json!({ "name": "shared" })).await;
    let id = project["id"].as_str().unwrap().to_string();

    h.request("POST", &format!("/projects/{id}/start"), Some(&token), None).await;
    h.wait_api_status(&token, &id, ProjectStatus::Running).await;

    let (mut a, _) = h.open_workspace(&token, &id).await;
    let (mut b, _) = h.open_workspace(&token, &id).await;

    a.send(Message::Text("from-a".into())).await.unwrap();
    b.send(Message::Text("from-b".into())).await.unwrap();
    assert_eq!(next_text(&mut a, Duration::from_secs(5)).await.unwrap(), "from-a");
    assert_eq!(next_text(&mut b, Duration::from_secs(5)).await.unwrap(), "from-b");

    // Closing one session leaves the other alive.
    a.close(None).await.unwrap();
    b.send(Message::Text("still-here".into())).await.unwrap();
    assert_eq!(next_text(&mut b, Duration::from_secs(5)).await.unwrap(), "still-here");

    // Activity metered the row.
    let (_, project) = h.request("GET", &format!("/projects/{id}"), Some(&token), None).await;
    assert!(project["last_accessed_at"].as_str().is_some());

    let _ = b.close(None).await;
}

#[tokio::test]
async fn workspace_upgrade_requires_running_project() {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Error as WsError;

    let h = Harness::spawn().await;
    let user = UserId::new();
    let token = h.token(user);
    let project = h.create_project(&token, json!({ "name": "cold" })).await;
    let id = project["id"].as_str().unwrap().to_string();

    // A stopped project rejects the upgrade with a 400 before any
    // upstream work happens.
    let mut request = format!("ws://{}/projects/{}/workspace", h.api, id)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", format!("bearer, {token}").parse().unwrap());
    match tokio_tungstenite::connect_async(request).await.unwrap_err() {
        WsError::Http(response) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn workspace_upgrade_requires_credentials() {
    let h = Harness::spawn().await;
    let token = h.token(UserId::new());
    let project = h.create_project(&token, json!({ "name": "locked" })).await;
    let id = project["id"].as_str().unwrap().to_string();

    let (status, _) = h.request("GET", &format!("/projects/{id}/workspace"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
