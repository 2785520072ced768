// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud provider: machines are instances of a remote machines API.
//!
//! The API follows the `apps/{app}/machines` shape: JSON CRUD plus
//! start/stop verbs. Volumes are created ahead of the machine and
//! attached by id at [`VOLUME_MOUNT_PATH`]. The provider's `private_ip`
//! is the reachable host (the daemon sits on the same private network).

use crate::{
    Machine, MachineConfig, MachineProvider, ProviderError, VolumeConfig, GUEST_SHELL_PORT,
    GUEST_WORKSPACE_PORT, VOLUME_MOUNT_PATH,
};
use async_trait::async_trait;
use loft_core::{HardwareSpec, MachineId, MachineState, VolumeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Guest shape forced onto accelerator machines; the accelerator path
/// overrides whatever cpu/memory the project asked for.
const GPU_CPUS: u32 = 8;
const GPU_MEMORY_MB: u32 = 32_768;

/// Operator configuration for the cloud provider.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Base URL of the machines API.
    pub api_url: String,
    pub api_token: String,
    /// Application namespace machines are created under.
    pub app: String,
}

/// [`MachineProvider`] backed by the remote machines API.
#[derive(Clone)]
pub struct CloudProvider {
    http: reqwest::Client,
    config: CloudConfig,
}

impl CloudProvider {
    pub fn new(config: CloudConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Fatal(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    fn machines_url(&self) -> String {
        format!("{}/v1/apps/{}/machines", self.config.api_url, self.config.app)
    }

    fn machine_url(&self, id: &MachineId) -> String {
        format!("{}/{}", self.machines_url(), id)
    }

    fn volumes_url(&self) -> String {
        format!("{}/v1/apps/{}/volumes", self.config.api_url, self.config.app)
    }

    async fn post_verb(&self, id: &MachineId, verb: &str) -> Result<(), ProviderError> {
        let url = format!("{}/{}", self.machine_url(id), verb);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(map_request_error)?;
        check(resp).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CreateMachineBody<'a> {
    name: &'a str,
    region: &'a str,
    config: GuestSpec<'a>,
}

#[derive(Serialize)]
struct GuestSpec<'a> {
    image: &'a str,
    guest: Guest,
    env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mounts: Vec<Mount<'a>>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct Guest {
    cpu_kind: String,
    cpus: u32,
    memory_mb: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    gpu_kind: Option<String>,
}

#[derive(Serialize)]
struct Mount<'a> {
    volume: &'a str,
    path: &'a str,
}

#[derive(Deserialize)]
struct MachineResponse {
    id: String,
    state: String,
    private_ip: Option<String>,
}

#[derive(Serialize)]
struct CreateVolumeBody<'a> {
    name: &'a str,
    region: &'a str,
    size_gb: u32,
}

#[derive(Deserialize)]
struct VolumeResponse {
    id: String,
}

impl MachineResponse {
    fn into_machine(self) -> Machine {
        Machine {
            id: MachineId::from(self.id),
            state: map_cloud_state(&self.state),
            host: self.private_ip,
            shell_port: GUEST_SHELL_PORT,
            workspace_port: GUEST_WORKSPACE_PORT,
        }
    }
}

#[async_trait]
impl MachineProvider for CloudProvider {
    async fn create_machine(&self, config: MachineConfig) -> Result<Machine, ProviderError> {
        let body = CreateMachineBody {
            name: &config.name,
            region: &config.region,
            config: GuestSpec {
                image: &config.image,
                guest: build_guest(&config.hardware),
                env: config.env.iter().cloned().collect(),
                mounts: config
                    .volume
                    .as_ref()
                    .map(|v| vec![Mount { volume: v.as_str(), path: VOLUME_MOUNT_PATH }])
                    .unwrap_or_default(),
            },
        };

        tracing::info!(name = %config.name, region = %config.region, "creating cloud machine");
        let resp = self
            .http
            .post(self.machines_url())
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;
        let machine: MachineResponse =
            check(resp).await?.json().await.map_err(map_request_error)?;
        Ok(machine.into_machine())
    }

    async fn get_machine(&self, id: &MachineId) -> Result<Machine, ProviderError> {
        let resp = self
            .http
            .get(self.machine_url(id))
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(map_request_error)?;
        let machine: MachineResponse =
            check(resp).await?.json().await.map_err(map_request_error)?;
        Ok(machine.into_machine())
    }

    async fn start_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        self.post_verb(id, "start").await
    }

    async fn stop_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        self.post_verb(id, "stop").await
    }

    async fn delete_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        let url = format!("{}?force=true", self.machine_url(id));
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(map_request_error)?;
        check(resp).await?;
        Ok(())
    }

    async fn create_volume(&self, config: VolumeConfig) -> Result<VolumeId, ProviderError> {
        let body = CreateVolumeBody {
            name: &config.name,
            region: &config.region,
            size_gb: config.size_gb,
        };
        let resp = self
            .http
            .post(self.volumes_url())
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;
        let volume: VolumeResponse =
            check(resp).await?.json().await.map_err(map_request_error)?;
        Ok(VolumeId::from(volume.id))
    }

    async fn delete_volume(&self, id: &VolumeId) -> Result<(), ProviderError> {
        let url = format!("{}/{}", self.volumes_url(), id);
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(map_request_error)?;
        check(resp).await?;
        Ok(())
    }
}

/// Build the guest shape, forcing the accelerator profile when one is
/// requested.
fn build_guest(hardware: &HardwareSpec) -> Guest {
    match hardware.gpu_kind {
        Some(gpu) => Guest {
            cpu_kind: "performance".to_string(),
            cpus: GPU_CPUS,
            memory_mb: GPU_MEMORY_MB,
            gpu_kind: Some(gpu.to_string()),
        },
        None => Guest {
            cpu_kind: hardware.cpu_class.to_string(),
            cpus: hardware.cpus,
            memory_mb: hardware.memory_mb,
            gpu_kind: None,
        },
    }
}

/// Map the machines API state vocabulary onto the normalized one.
fn map_cloud_state(state: &str) -> MachineState {
    match state {
        "created" => MachineState::Created,
        "starting" | "replacing" => MachineState::Starting,
        "started" => MachineState::Started,
        "stopping" | "destroying" => MachineState::Stopping,
        "stopped" | "suspended" => MachineState::Stopped,
        "destroyed" => MachineState::Destroyed,
        _ => MachineState::Stopped,
    }
}

/// Surface non-2xx responses through the error taxonomy.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(map_status(status.as_u16(), &body))
}

fn map_status(code: u16, body: &str) -> ProviderError {
    let message = format!("status {code}: {body}");
    match code {
        404 => ProviderError::NotFound(message),
        408 | 429 | 500..=599 => ProviderError::Transient(message),
        _ => ProviderError::Fatal(message),
    }
}

/// Network-level failures are retryable by definition.
fn map_request_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Transient(e.to_string())
}

#[cfg(test)]
#[path = "cloud_tests.rs"]
mod tests;
