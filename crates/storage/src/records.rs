// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row types for projects and infra services.
//!
//! Records are transient cursors over rows: handlers and workers fetch,
//! inspect, and drop them. Nothing holds a record across an await that
//! could observe a concurrent transition.

use chrono::{DateTime, Utc};
use loft_core::{
    HardwareSpec, MachineId, ProjectId, ProjectStatus, ServiceId, ServiceStatus, UserId, VolumeId,
};
use serde::{Deserialize, Serialize};

/// One project row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub base_image: String,
    #[serde(flatten)]
    pub hardware: HardwareSpec,
    pub machine_id: Option<MachineId>,
    pub volume_id: Option<VolumeId>,
    pub status: ProjectStatus,
    pub error_message: Option<String>,
    /// `None` and `Some(0)` both mean never auto-stop.
    pub idle_timeout_minutes: Option<u32>,
    /// When false, preview requests must carry the capability token.
    pub public: bool,
    #[serde(skip_serializing)]
    pub capability_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl ProjectRecord {
    /// Idle cutoff for the sweeper; `None` means never evict.
    pub fn idle_deadline(&self) -> Option<(DateTime<Utc>, chrono::Duration)> {
        let minutes = self.idle_timeout_minutes.filter(|m| *m > 0)?;
        let last = self.last_accessed_at?;
        Some((last, chrono::Duration::minutes(i64::from(minutes))))
    }
}

loft_core::builder! {
    pub struct ProjectRecordBuilder => ProjectRecord {
        into {
            name: String = "test-project",
            base_image: String = "loft-base:latest",
        }
        set {
            user_id: UserId = UserId::new(),
            hardware: HardwareSpec = HardwareSpec {
                cpu_class: loft_core::CpuClass::Shared,
                cpus: 1,
                memory_mb: 1024,
                volume_size_gb: 10,
                gpu_kind: None,
            },
            status: ProjectStatus = ProjectStatus::Stopped,
            public: bool = false,
        }
        option {
            description: String = None,
            machine_id: MachineId = None,
            volume_id: VolumeId = None,
            error_message: String = None,
            idle_timeout_minutes: u32 = None,
            last_accessed_at: DateTime<Utc> = None,
        }
        computed {
            id: ProjectId = ProjectId::new(),
            capability_token: String = loft_core::generate_capability_token(),
            created_at: DateTime<Utc> = Utc::now(),
            updated_at: DateTime<Utc> = Utc::now(),
        }
    }
}

/// Fields required to insert a project. Id, capability token, status, and
/// timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub base_image: String,
    pub hardware: HardwareSpec,
    pub idle_timeout_minutes: Option<u32>,
}

/// Partial metadata update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub hardware: Option<HardwareSpec>,
    pub idle_timeout_minutes: Option<u32>,
    pub public: Option<bool>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.hardware.is_none()
            && self.idle_timeout_minutes.is_none()
            && self.public.is_none()
    }
}

/// One auxiliary infra service row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfraServiceRecord {
    pub id: ServiceId,
    pub project_id: ProjectId,
    pub service_type: String,
    pub name: String,
    pub status: ServiceStatus,
    pub machine_id: Option<MachineId>,
    pub volume_id: Option<VolumeId>,
    /// AEAD ciphertext of the connection details; decrypted only by the
    /// infra manager, and only when status is `ready`.
    #[serde(skip_serializing)]
    pub connection_ciphertext: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert an infra service (inserted as `pending`).
#[derive(Debug, Clone)]
pub struct NewInfraService {
    pub project_id: ProjectId,
    pub service_type: String,
    pub name: String,
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod tests;
