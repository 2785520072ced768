// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ownership isolation: another user's project reads as missing.

use crate::prelude::*;
use hyper::StatusCode;
use loft_core::UserId;

#[tokio::test]
async fn foreign_projects_are_indistinguishable_from_missing() {
    let h = Harness::spawn().await;
    let owner = h.token(UserId::new());
    let intruder = h.token(UserId::new());

    let project = h.create_project(&owner, json!({ "name": "private" })).await;
    let id = project["id"].as_str().unwrap().to_string();

    // 404, not 403. The row's existence is not disclosed.
    let (status, _) = h.request("GET", &format!("/projects/{id}"), Some(&intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        h.request("POST", &format!("/projects/{id}/start"), Some(&intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        h.request("DELETE", &format!("/projects/{id}"), Some(&intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Listings stay per-user.
    let (_, mine) = h.request("GET", "/projects", Some(&owner), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = h.request("GET", "/projects", Some(&intruder), None).await;
    assert_eq!(theirs.as_array().unwrap().len(), 0);

    // And the owner still has the row, untouched.
    let (status, _) = h.request("GET", &format!("/projects/{id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
}
