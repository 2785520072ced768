// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker provider: machines are containers on a named bridge network.
//!
//! The container engine CLI is driven directly (run, start, stop, rm,
//! inspect). Creation publishes the shell and workspace ports and mounts
//! the project's persistent directory; `get_machine` resolves the
//! container's address on the named network, which is where the daemon
//! reaches it from inside the same compose network. Volumes are plain
//! directories under a configured root; deleting them is left to the
//! operator.

use crate::{
    Machine, MachineConfig, MachineProvider, ProviderError, VolumeConfig, GUEST_SHELL_PORT,
    GUEST_WORKSPACE_PORT, VOLUME_MOUNT_PATH,
};
use async_trait::async_trait;
use loft_core::{MachineId, MachineState, VolumeId};
use std::path::PathBuf;

/// Operator configuration for the Docker provider.
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Bridge network containers are attached to.
    pub network: String,
    /// Root directory for project volumes.
    pub volume_root: PathBuf,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            network: "loft-net".to_string(),
            volume_root: PathBuf::from("/var/lib/loft/volumes"),
        }
    }
}

/// [`MachineProvider`] backed by the local container engine.
#[derive(Debug, Clone)]
pub struct DockerProvider {
    config: DockerConfig,
}

impl DockerProvider {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    /// Create the bridge network if it does not exist yet.
    async fn ensure_network(&self) -> Result<(), ProviderError> {
        match run_docker(&["network", "create", &self.config.network]).await {
            Ok(_) => Ok(()),
            Err(stderr) if stderr.contains("already exists") => Ok(()),
            Err(stderr) => Err(classify_docker_error(&stderr)),
        }
    }

    fn inspect_format(&self) -> String {
        format!(
            "{{{{.State.Status}}}}|{{{{with (index .NetworkSettings.Networks {:?})}}}}{{{{.IPAddress}}}}{{{{end}}}}",
            self.config.network
        )
    }
}

#[async_trait]
impl MachineProvider for DockerProvider {
    async fn create_machine(&self, config: MachineConfig) -> Result<Machine, ProviderError> {
        self.ensure_network().await?;

        let shell_publish = format!("0:{GUEST_SHELL_PORT}");
        let workspace_publish = format!("0:{GUEST_WORKSPACE_PORT}");
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            config.name.clone(),
            "--network".to_string(),
            self.config.network.clone(),
            "-p".to_string(),
            shell_publish,
            "-p".to_string(),
            workspace_publish,
        ];

        if let Some(ref volume) = config.volume {
            let dir = self.config.volume_root.join(volume.as_str());
            args.push("--mount".to_string());
            args.push(format!(
                "type=bind,src={},dst={}",
                dir.display(),
                VOLUME_MOUNT_PATH
            ));
        }

        for (key, value) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }

        args.push(config.image.clone());

        tracing::info!(name = %config.name, image = %config.image, "launching container");
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        run_docker(&arg_refs).await.map_err(|e| classify_docker_error(&e))?;

        let id = MachineId::from(config.name);
        self.get_machine(&id).await
    }

    async fn get_machine(&self, id: &MachineId) -> Result<Machine, ProviderError> {
        let format = self.inspect_format();
        let output = run_docker(&["inspect", "-f", &format, id.as_str()])
            .await
            .map_err(|e| classify_docker_error(&e))?;
        let (state, host) = parse_inspect_output(&output);
        Ok(Machine {
            id: id.clone(),
            state,
            host,
            shell_port: GUEST_SHELL_PORT,
            workspace_port: GUEST_WORKSPACE_PORT,
        })
    }

    async fn start_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        run_docker(&["start", id.as_str()])
            .await
            .map(|_| ())
            .map_err(|e| classify_docker_error(&e))
    }

    async fn stop_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        run_docker(&["stop", id.as_str()])
            .await
            .map(|_| ())
            .map_err(|e| classify_docker_error(&e))
    }

    async fn delete_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        run_docker(&["rm", "-f", id.as_str()])
            .await
            .map(|_| ())
            .map_err(|e| classify_docker_error(&e))
    }

    async fn create_volume(&self, config: VolumeConfig) -> Result<VolumeId, ProviderError> {
        // Size is advisory in Docker mode; the directory grows with use.
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let name = format!("{}-{}", config.name, suffix);
        let dir = self.config.volume_root.join(&name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProviderError::Fatal(format!("volume dir {}: {}", dir.display(), e)))?;
        tracing::info!(volume = %name, "created volume directory");
        Ok(VolumeId::from(name))
    }

    async fn delete_volume(&self, id: &VolumeId) -> Result<(), ProviderError> {
        // Deletion is the operator's call; keep the data.
        tracing::info!(volume = %id, root = %self.config.volume_root.display(),
            "volume directory retained, delete manually if unwanted");
        Ok(())
    }
}

/// Parse `status|ip` from the inspect template output.
fn parse_inspect_output(output: &str) -> (MachineState, Option<String>) {
    let trimmed = output.trim();
    let (status, ip) = trimmed.split_once('|').unwrap_or((trimmed, ""));
    let host = if ip.is_empty() { None } else { Some(ip.to_string()) };
    (map_docker_state(status), host)
}

/// Map the container engine's state vocabulary onto the normalized one.
fn map_docker_state(status: &str) -> MachineState {
    match status {
        "created" => MachineState::Created,
        "restarting" => MachineState::Starting,
        "running" => MachineState::Started,
        "removing" => MachineState::Stopping,
        "paused" | "exited" | "dead" => MachineState::Stopped,
        _ => MachineState::Stopped,
    }
}

/// Classify a CLI failure into the provider error taxonomy.
fn classify_docker_error(stderr: &str) -> ProviderError {
    if stderr.contains("No such container") || stderr.contains("No such object") {
        ProviderError::NotFound(stderr.to_string())
    } else if stderr.contains("Cannot connect to the Docker daemon")
        || stderr.contains("connection refused")
        || stderr.contains("i/o timeout")
    {
        ProviderError::Transient(stderr.to_string())
    } else {
        ProviderError::Fatal(stderr.to_string())
    }
}

/// Run a docker CLI command and return stdout on success.
async fn run_docker(args: &[&str]) -> Result<String, String> {
    let output = tokio::process::Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to exec docker: {}", e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("docker {} failed: {}", args.first().unwrap_or(&""), stderr.trim()))
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
