// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy-path lifecycle and the bad-upstream session path.

use crate::prelude::*;
use base64::Engine as _;
use futures_util::SinkExt;
use hyper::StatusCode;
use loft_core::{ProjectStatus, UserId};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn project_lifecycle_end_to_end() {
    let h = Harness::spawn().await;
    let upstream = spawn_echo_upstream().await;
    h.provider.set_endpoint("127.0.0.1", 2222, upstream.addr.port());

    let user = UserId::new();
    let token = h.token(user);

    // Create: 201, stopped, no bindings yet.
    let project = h.create_project(&token, json!({ "name": "demo" })).await;
    assert_eq!(project["status"], "stopped");
    assert!(project["machine_id"].is_null());
    let id = project["id"].as_str().unwrap().to_string();

    // Start: 202 accepted with a terminal URL.
    let (status, accepted) =
        h.request("POST", &format!("/projects/{id}/start"), Some(&token), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["status"], "starting");
    assert!(accepted["terminal_url"].as_str().unwrap().contains(&id));

    // Poll until running; machine and volume are bound.
    let running = h.wait_api_status(&token, &id, ProjectStatus::Running).await;
    assert!(running["machine_id"].as_str().is_some());
    assert!(running["volume_id"].as_str().is_some());

    // Workspace session over the subprotocol smuggle.
    let (mut ws, protocol) = h.open_workspace(&token, &id).await;
    assert_eq!(protocol.as_deref(), Some("bearer"));

    // Bytes sent by the client appear on upstream in order (the echo
    // sends them straight back).
    for i in 0..3 {
        ws.send(Message::Text(format!("frame-{i}").into())).await.unwrap();
    }
    for i in 0..3 {
        let echoed = next_text(&mut ws, Duration::from_secs(5)).await.unwrap();
        assert_eq!(echoed, format!("frame-{i}"));
    }

    // The dial smuggled the agent env as base64 headers.
    let headers = upstream.env_headers.lock().unwrap().clone();
    let (_, encoded) = headers
        .iter()
        .find(|(name, _)| name == "x-agent-env-project_id")
        .expect("PROJECT_ID env header")
        .clone();
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
    assert_eq!(String::from_utf8(decoded).unwrap(), id);

    let _ = ws.close(None).await;
}

#[tokio::test]
async fn failed_upstream_dial_sends_error_frame_and_keeps_project_running() {
    let h = Harness::spawn().await;
    // Point the workspace port at a hole; every dial attempt refuses.
    let dead_port = unused_port().await;
    h.provider.set_endpoint("127.0.0.1", 2222, dead_port);

    let user = UserId::new();
    let token = h.token(user);
    let project = h.create_project(&token, json!({ "name": "demo" })).await;
    let id = project["id"].as_str().unwrap().to_string();

    h.request("POST", &format!("/projects/{id}/start"), Some(&token), None).await;
    h.wait_api_status(&token, &id, ProjectStatus::Running).await;

    // The upgrade itself succeeds; the failure arrives as a frame.
    let (mut ws, _) = h.open_workspace(&token, &id).await;
    let frame = next_text(&mut ws, Duration::from_secs(20)).await.expect("error frame");
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["channel"], "error");
    assert_eq!(value["type"], "error");
    assert!(value["error"].as_str().unwrap().contains("connect"));

    // The socket closes afterwards and the project is untouched.
    assert!(next_text(&mut ws, Duration::from_secs(5)).await.is_none());
    let (_, project) = h.request("GET", &format!("/projects/{id}"), Some(&token), None).await;
    assert_eq!(project["status"], "running");
}
