// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle eviction through the sweeper.

use crate::prelude::*;
use loft_adapters::MachineProvider;
use loft_core::{FakeClock, MachineId, MachineState, ProjectStatus, UserId};
use loft_engine::{EngineConfig, IdleSweeper};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn idle_project_is_stopped_within_a_sweep() {
    let h = Harness::spawn().await;
    let user = UserId::new();
    let token = h.token(user);

    let project = h
        .create_project(&token, json!({ "name": "sleepy", "idle_timeout_minutes": 1 }))
        .await;
    let id = project["id"].as_str().unwrap().to_string();

    h.request("POST", &format!("/projects/{id}/start"), Some(&token), None).await;
    let running = h.wait_api_status(&token, &id, ProjectStatus::Running).await;
    let machine = MachineId::from(running["machine_id"].as_str().unwrap());

    // A sweeper with a controllable clock over the same store/provider.
    let clock = FakeClock::new();
    let provider: Arc<dyn MachineProvider> = Arc::new(h.provider.clone());
    let sweeper = IdleSweeper::new(
        h.state.store.clone(),
        provider,
        Arc::new(EngineConfig::default()),
        clock.clone(),
    );

    // Inside the window: nothing happens.
    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    assert_eq!(h.provider.machine_state(&machine), Some(MachineState::Started));

    // Two idle minutes later the project is stopped and so is the
    // machine.
    clock.advance(Duration::from_secs(120));
    assert_eq!(sweeper.sweep_once().await.unwrap(), 1);

    let stopped = h.wait_api_status(&token, &id, ProjectStatus::Stopped).await;
    assert_eq!(stopped["status"], "stopped");
    assert_eq!(h.provider.machine_state(&machine), Some(MachineState::Stopped));

    // An explicit restart works afterwards.
    let (status, _) =
        h.request("POST", &format!("/projects/{id}/start"), Some(&token), None).await;
    assert_eq!(status, hyper::StatusCode::ACCEPTED);
    h.wait_api_status(&token, &id, ProjectStatus::Running).await;
}
