// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hardware shapes, named presets, and validation.

use crate::error::FieldError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Region every accelerator-bearing machine is forced into (the provider
/// only stocks accelerators there, and volumes must be co-located).
pub const GPU_REGION: &str = "ord";

/// CPU class of the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuClass {
    Shared,
    Performance,
}

crate::simple_display! {
    CpuClass {
        Shared => "shared",
        Performance => "performance",
    }
}

impl FromStr for CpuClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(Self::Shared),
            "performance" => Ok(Self::Performance),
            other => Err(format!("unknown cpu class: {other:?}")),
        }
    }
}

/// Accelerator classes the platform allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuKind {
    #[serde(rename = "a100-40gb")]
    A100_40Gb,
    #[serde(rename = "a100-80gb")]
    A100_80Gb,
    #[serde(rename = "l40s")]
    L40s,
}

crate::simple_display! {
    GpuKind {
        A100_40Gb => "a100-40gb",
        A100_80Gb => "a100-80gb",
        L40s => "l40s",
    }
}

impl FromStr for GpuKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a100-40gb" => Ok(Self::A100_40Gb),
            "a100-80gb" => Ok(Self::A100_80Gb),
            "l40s" => Ok(Self::L40s),
            other => Err(format!("unknown accelerator class: {other:?}")),
        }
    }
}

/// Desired guest hardware for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSpec {
    pub cpu_class: CpuClass,
    pub cpus: u32,
    pub memory_mb: u32,
    pub volume_size_gb: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_kind: Option<GpuKind>,
}

impl HardwareSpec {
    /// Look up a named preset. Presets are request-layer sugar; the core
    /// state machine only ever sees the expanded tuple.
    pub fn preset(name: &str) -> Option<HardwareSpec> {
        match name {
            "basic" => Some(HardwareSpec {
                cpu_class: CpuClass::Shared,
                cpus: 1,
                memory_mb: 1024,
                volume_size_gb: 10,
                gpu_kind: None,
            }),
            "standard" => Some(HardwareSpec {
                cpu_class: CpuClass::Shared,
                cpus: 2,
                memory_mb: 4096,
                volume_size_gb: 20,
                gpu_kind: None,
            }),
            "performance" => Some(HardwareSpec {
                cpu_class: CpuClass::Performance,
                cpus: 4,
                memory_mb: 8192,
                volume_size_gb: 50,
                gpu_kind: None,
            }),
            "gpu" => Some(HardwareSpec {
                cpu_class: CpuClass::Performance,
                cpus: 8,
                memory_mb: 32768,
                volume_size_gb: 100,
                gpu_kind: Some(GpuKind::A100_80Gb),
            }),
            _ => None,
        }
    }

    /// Validate ranges per cpu class. Accumulates every failure so the
    /// request layer can surface the whole list in one 400.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        let (cpu_range, mem_range) = match self.cpu_class {
            CpuClass::Shared => (1..=8u32, 256..=16_384u32),
            CpuClass::Performance => (1..=16u32, 2048..=65_536u32),
        };

        if !cpu_range.contains(&self.cpus) {
            errors.push(FieldError::new(
                "cpus",
                format!(
                    "{} class allows {}-{} cpus, got {}",
                    self.cpu_class,
                    cpu_range.start(),
                    cpu_range.end(),
                    self.cpus
                ),
            ));
        }

        if !mem_range.contains(&self.memory_mb) {
            errors.push(FieldError::new(
                "memory_mb",
                format!(
                    "{} class allows {}-{} MB, got {}",
                    self.cpu_class,
                    mem_range.start(),
                    mem_range.end(),
                    self.memory_mb
                ),
            ));
        } else if self.memory_mb % 256 != 0 {
            errors.push(FieldError::new("memory_mb", "must be a multiple of 256"));
        }

        if !(1..=500).contains(&self.volume_size_gb) {
            errors.push(FieldError::new(
                "volume_size_gb",
                format!("must be 1-500 GB, got {}", self.volume_size_gb),
            ));
        }

        if self.gpu_kind.is_some() && self.cpu_class != CpuClass::Performance {
            errors.push(FieldError::new("gpu_kind", "accelerators require the performance class"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Region the machine (and its volume) must be created in.
    ///
    /// Accelerator machines are pinned to [`GPU_REGION`]; everything else
    /// takes the operator default.
    pub fn region<'a>(&self, default_region: &'a str) -> &'a str {
        if self.gpu_kind.is_some() {
            GPU_REGION
        } else {
            default_region
        }
    }
}

#[cfg(test)]
#[path = "hardware_tests.rs"]
mod tests;
