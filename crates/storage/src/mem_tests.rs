// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::records::{NewInfraService, NewProject, ProjectPatch};
use crate::store::Store;
use loft_core::{HardwareSpec, MachineId, ProjectStatus, ServiceStatus, UserId, UserSettings};

fn new_project(user: UserId) -> NewProject {
    NewProject {
        user_id: user,
        name: "demo".to_string(),
        description: None,
        base_image: "loft-base:latest".to_string(),
        hardware: HardwareSpec::preset("basic").unwrap(),
        idle_timeout_minutes: Some(30),
    }
}

#[tokio::test]
async fn create_project_defaults() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();

    assert_eq!(project.status, ProjectStatus::Stopped);
    assert!(project.machine_id.is_none());
    assert!(project.volume_id.is_none());
    assert!(project.last_accessed_at.is_none());
    assert!(!project.public);
    assert_eq!(project.capability_token.len(), 16);
}

#[tokio::test]
async fn ownership_mismatch_is_not_found() {
    let store = MemStore::new();
    let owner = UserId::new();
    let project = store.create_project(new_project(owner)).await.unwrap();

    let err = store.get_project_by_user(project.id, UserId::new()).await.unwrap_err();
    assert!(err.is_not_found());

    // The owner still sees it.
    assert!(store.get_project_by_user(project.id, owner).await.is_ok());
}

#[tokio::test]
async fn prefix_lookup_finds_project() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();

    let found = store.get_project_by_prefix(&project.id.prefix8()).await.unwrap();
    assert_eq!(found.id, project.id);

    assert!(store.get_project_by_prefix("00000000").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn legal_transition_chain() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();
    let machine = MachineId::from("m-1");

    store.transition_project(project.id, "starting", None, None).await.unwrap();
    let running = store
        .transition_project(project.id, "running", None, Some(&machine))
        .await
        .unwrap();
    assert_eq!(running.status, ProjectStatus::Running);
    assert_eq!(running.machine_id, Some(machine));

    store.transition_project(project.id, "stopping", None, None).await.unwrap();
    let stopped = store.transition_project(project.id, "stopped", None, None).await.unwrap();
    assert_eq!(stopped.status, ProjectStatus::Stopped);
    // Volume binding survives stop/start; machine id is retained too.
    assert!(stopped.machine_id.is_some());
}

#[tokio::test]
async fn illegal_transition_rejected() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();

    let err = store.transition_project(project.id, "running", None, None).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn undefined_status_refused() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();

    let err = store.transition_project(project.id, "paused", None, None).await.unwrap_err();
    assert!(matches!(err, StoreError::UndefinedStatus(_)));
}

#[tokio::test]
async fn error_message_set_and_cleared() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();

    store.transition_project(project.id, "starting", None, None).await.unwrap();
    let errored = store
        .transition_project(project.id, "error", Some("volume create failed"), None)
        .await
        .unwrap();
    assert_eq!(errored.error_message.as_deref(), Some("volume create failed"));

    // Retry clears the message.
    let retrying = store.transition_project(project.id, "starting", None, None).await.unwrap();
    assert_eq!(retrying.error_message, None);
}

#[tokio::test]
async fn machine_id_setter_is_idempotent() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();
    let machine = MachineId::from("m-1");

    store.set_machine_id(project.id, &machine).await.unwrap();
    let after_first = store.get_project(project.id).await.unwrap().updated_at;

    store.set_machine_id(project.id, &machine).await.unwrap();
    let after_second = store.get_project(project.id).await.unwrap();
    assert_eq!(after_second.updated_at, after_first);
    assert_eq!(after_second.machine_id, Some(machine));
}

#[tokio::test]
async fn last_accessed_is_monotonic() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();

    store.bump_last_accessed(project.id).await.unwrap();
    let first = store.get_project(project.id).await.unwrap().last_accessed_at.unwrap();

    store.bump_last_accessed(project.id).await.unwrap();
    let second = store.get_project(project.id).await.unwrap().last_accessed_at.unwrap();
    assert!(second >= first);
}

#[tokio::test]
async fn running_projects_bounded_and_oldest_first() {
    let store = MemStore::new();
    let user = UserId::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let p = store.create_project(new_project(user)).await.unwrap();
        store.transition_project(p.id, "starting", None, None).await.unwrap();
        store.transition_project(p.id, "running", None, None).await.unwrap();
        store.bump_last_accessed(p.id).await.unwrap();
        ids.push(p.id);
    }
    // One stopped project that must never show up.
    store.create_project(new_project(user)).await.unwrap();

    let all = store.running_projects(10).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].last_accessed_at <= w[1].last_accessed_at));

    let page = store.running_projects(2).await.unwrap();
    assert_eq!(page.len(), 2);
}

#[tokio::test]
async fn rotate_capability_token_scoped_to_owner() {
    let store = MemStore::new();
    let owner = UserId::new();
    let project = store.create_project(new_project(owner)).await.unwrap();
    let original = project.capability_token.clone();

    let err = store.rotate_capability_token(project.id, UserId::new()).await.unwrap_err();
    assert!(err.is_not_found());

    let rotated = store.rotate_capability_token(project.id, owner).await.unwrap();
    assert_ne!(rotated, original);
    assert_eq!(store.get_project(project.id).await.unwrap().capability_token, rotated);
}

#[tokio::test]
async fn patch_updates_only_provided_fields() {
    let store = MemStore::new();
    let owner = UserId::new();
    let project = store.create_project(new_project(owner)).await.unwrap();

    let patch = ProjectPatch { public: Some(true), ..Default::default() };
    let updated = store.update_project_meta(project.id, owner, patch).await.unwrap();
    assert!(updated.public);
    assert_eq!(updated.name, "demo");
    assert_eq!(updated.idle_timeout_minutes, Some(30));
}

#[tokio::test]
async fn hardware_patch_requires_stopped_or_error() {
    let store = MemStore::new();
    let owner = UserId::new();
    let project = store.create_project(new_project(owner)).await.unwrap();
    store.transition_project(project.id, "starting", None, None).await.unwrap();
    store.transition_project(project.id, "running", None, None).await.unwrap();

    let hardware_patch = ProjectPatch {
        hardware: Some(HardwareSpec::preset("standard").unwrap()),
        ..Default::default()
    };
    let err = store
        .update_project_meta(project.id, owner, hardware_patch.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    // Non-hardware fields still patch while running.
    let name_patch = ProjectPatch { name: Some("renamed".to_string()), ..Default::default() };
    let updated = store.update_project_meta(project.id, owner, name_patch).await.unwrap();
    assert_eq!(updated.name, "renamed");

    // Once stopped, the hardware patch lands.
    store.transition_project(project.id, "stopping", None, None).await.unwrap();
    store.transition_project(project.id, "stopped", None, None).await.unwrap();
    let updated = store.update_project_meta(project.id, owner, hardware_patch).await.unwrap();
    assert_eq!(updated.hardware, HardwareSpec::preset("standard").unwrap());
}

#[tokio::test]
async fn delete_removes_project_and_services() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();
    let service = store
        .create_service(NewInfraService {
            project_id: project.id,
            service_type: "postgres".to_string(),
            name: "db".to_string(),
        })
        .await
        .unwrap();

    store.delete_project(project.id).await.unwrap();
    assert!(store.get_project(project.id).await.unwrap_err().is_not_found());
    assert!(store.get_service(project.id, service.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn service_dedupe_sees_pending_and_ready_only() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();
    let new_service = |t: &str| NewInfraService {
        project_id: project.id,
        service_type: t.to_string(),
        name: t.to_string(),
    };

    let svc = store.create_service(new_service("postgres")).await.unwrap();
    assert!(store
        .active_service_of_type(project.id, "postgres")
        .await
        .unwrap()
        .is_some());
    assert!(store.active_service_of_type(project.id, "redis").await.unwrap().is_none());

    // An errored service frees the slot.
    store.transition_service(svc.id, "error", Some("boom")).await.unwrap();
    assert!(store.active_service_of_type(project.id, "postgres").await.unwrap().is_none());
}

#[tokio::test]
async fn service_ready_requires_pending() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();
    let svc = store
        .create_service(NewInfraService {
            project_id: project.id,
            service_type: "postgres".to_string(),
            name: "db".to_string(),
        })
        .await
        .unwrap();

    store.set_service_ready(svc.id, "ciphertext-1").await.unwrap();
    let ready = store.get_service(project.id, svc.id).await.unwrap();
    assert_eq!(ready.status, ServiceStatus::Ready);
    assert_eq!(ready.connection_ciphertext.as_deref(), Some("ciphertext-1"));

    // Second ready write is an illegal transition, not a silent overwrite.
    let err = store.set_service_ready(svc.id, "ciphertext-2").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn deleted_service_is_terminal() {
    let store = MemStore::new();
    let project = store.create_project(new_project(UserId::new())).await.unwrap();
    let svc = store
        .create_service(NewInfraService {
            project_id: project.id,
            service_type: "redis".to_string(),
            name: "cache".to_string(),
        })
        .await
        .unwrap();

    store.transition_service(svc.id, "deleted", None).await.unwrap();
    let err = store.transition_service(svc.id, "ready", None).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    // Deleted services drop out of listings.
    assert!(store.list_services(project.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn mark_interrupted_flips_only_in_flight_rows() {
    let store = MemStore::new();
    let user = UserId::new();

    let starting = store.create_project(new_project(user)).await.unwrap();
    store.transition_project(starting.id, "starting", None, None).await.unwrap();
    let stopped = store.create_project(new_project(user)).await.unwrap();

    assert_eq!(store.mark_interrupted("restart").await.unwrap(), 1);
    let flipped = store.get_project(starting.id).await.unwrap();
    assert_eq!(flipped.status, ProjectStatus::Error);
    assert_eq!(flipped.error_message.as_deref(), Some("restart"));
    assert_eq!(store.get_project(stopped.id).await.unwrap().status, ProjectStatus::Stopped);

    // Idempotent: a second pass finds nothing in flight.
    assert_eq!(store.mark_interrupted("restart").await.unwrap(), 0);
}

#[tokio::test]
async fn settings_and_api_keys_roundtrip() {
    let store = MemStore::new();
    let user = UserId::new();

    assert!(store.get_user_settings(user).await.unwrap().is_none());
    let settings = UserSettings::default();
    store.put_user_settings(user, &settings).await.unwrap();
    assert_eq!(store.get_user_settings(user).await.unwrap(), Some(settings));

    assert!(store.get_api_keys_ciphertext(user).await.unwrap().is_none());
    store.put_api_keys_ciphertext(user, "opaque").await.unwrap();
    assert_eq!(store.get_api_keys_ciphertext(user).await.unwrap().as_deref(), Some("opaque"));
}
