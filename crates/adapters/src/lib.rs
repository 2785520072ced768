// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loft-adapters: the machine/volume provider abstraction.
//!
//! One contract, two implementations. [`DockerProvider`] drives a local
//! container engine through its CLI; [`CloudProvider`] talks to a remote
//! machines API. The lifecycle manager only ever sees the normalized
//! [`MachineState`] vocabulary and the split between retryable and fatal
//! errors.

pub mod cloud;
pub mod docker;

pub use cloud::{CloudConfig, CloudProvider};
pub use docker::{DockerConfig, DockerProvider};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeProvider;

use async_trait::async_trait;
use loft_core::{HardwareSpec, MachineId, MachineState, VolumeId};
use std::time::Duration;
use thiserror::Error;

/// Guest port the interactive shell listens on.
pub const GUEST_SHELL_PORT: u16 = 2222;
/// Guest port the workspace daemon listens on.
pub const GUEST_WORKSPACE_PORT: u16 = 8080;
/// Mount path for the project volume inside the guest.
pub const VOLUME_MOUNT_PATH: &str = "/home/user";

/// Interval between polls inside [`MachineProvider::wait_for_state`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors from provider operations.
///
/// `Transient` is the retryable class (network blips, daemon hiccups,
/// rate limits); everything else is surfaced to the caller as-is.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("provider error: {0}")]
    Fatal(String),
    #[error("timed out after {timeout:?} waiting for {id} to reach {target}")]
    WaitTimeout { id: MachineId, target: MachineState, timeout: Duration },
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Everything needed to create a machine.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Provider-visible name (e.g. `loft-<project id>`).
    pub name: String,
    /// Guest image tag.
    pub image: String,
    pub region: String,
    pub hardware: HardwareSpec,
    /// Environment injected into the guest.
    pub env: Vec<(String, String)>,
    /// Volume to attach at [`VOLUME_MOUNT_PATH`], if any.
    pub volume: Option<VolumeId>,
}

impl MachineConfig {
    pub fn new(name: impl Into<String>, image: impl Into<String>, hardware: HardwareSpec) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            region: String::new(),
            hardware,
            env: Vec::new(),
            volume: None,
        }
    }

    loft_core::setters! {
        into {
            region: String,
        }
        set {
            env: Vec<(String, String)>,
        }
        option {
            volume: VolumeId,
        }
    }
}

/// Everything needed to create a volume.
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    pub name: String,
    pub size_gb: u32,
    pub region: String,
}

/// Point-in-time view of a machine, normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub id: MachineId,
    pub state: MachineState,
    /// Private address reachable by this process. `None` until the
    /// provider has assigned one.
    pub host: Option<String>,
    pub shell_port: u16,
    pub workspace_port: u16,
}

/// Uniform machine and volume operations.
///
/// Implementations map their native state vocabulary onto
/// [`MachineState`] and classify failures into [`ProviderError`].
#[async_trait]
pub trait MachineProvider: Send + Sync + 'static {
    async fn create_machine(&self, config: MachineConfig) -> Result<Machine, ProviderError>;

    async fn get_machine(&self, id: &MachineId) -> Result<Machine, ProviderError>;

    async fn start_machine(&self, id: &MachineId) -> Result<(), ProviderError>;

    async fn stop_machine(&self, id: &MachineId) -> Result<(), ProviderError>;

    async fn delete_machine(&self, id: &MachineId) -> Result<(), ProviderError>;

    /// Poll until the machine reports `target`, failing with
    /// [`ProviderError::WaitTimeout`] once `timeout` has elapsed.
    ///
    /// Transient read errors during the wait are tolerated; the next poll
    /// retries them.
    async fn wait_for_state(
        &self,
        id: &MachineId,
        target: MachineState,
        timeout: Duration,
    ) -> Result<(), ProviderError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.get_machine(id).await {
                Ok(machine) if machine.state == target => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    tracing::debug!(%id, error = %e, "transient error while waiting, retrying");
                }
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::WaitTimeout { id: id.clone(), target, timeout });
            }
            tokio::time::sleep_until(
                std::cmp::min(deadline, tokio::time::Instant::now() + WAIT_POLL_INTERVAL),
            )
            .await;
        }
    }

    async fn create_volume(&self, config: VolumeConfig) -> Result<VolumeId, ProviderError>;

    /// Best-effort; Docker mode leaves the directory for the operator.
    async fn delete_volume(&self, id: &VolumeId) -> Result<(), ProviderError>;
}
