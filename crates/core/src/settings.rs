// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user defaults for new projects.
//!
//! Applied only by the request layer when a create request omits fields;
//! the core state machine never reads these.

use crate::hardware::HardwareSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub default_hardware: HardwareSpec,
    /// `None` and `Some(0)` both mean never auto-stop.
    pub default_idle_timeout_minutes: Option<u32>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            // Presets are compiled in; "basic" always exists.
            default_hardware: HardwareSpec::preset("basic").unwrap_or(HardwareSpec {
                cpu_class: crate::hardware::CpuClass::Shared,
                cpus: 1,
                memory_mb: 1024,
                volume_size_gb: 10,
                gpu_kind: None,
            }),
            default_idle_timeout_minutes: Some(30),
        }
    }
}
