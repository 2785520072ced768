// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection resolver: project → reachable endpoint.
//!
//! Hides the provider split. The cloud provider hands back its private
//! address; the Docker provider hands back the container's address on
//! the named network. Either way the caller gets one host and the two
//! guest ports.

use crate::error::EngineError;
use loft_adapters::MachineProvider;
use loft_core::MachineState;
use loft_storage::ProjectRecord;
use std::sync::Arc;

/// Where a project's guest can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub host: String,
    pub shell_port: u16,
    pub workspace_port: u16,
}

impl Endpoints {
    /// Upstream dial target for the workspace session bridge.
    pub fn workspace_url(&self) -> String {
        format!("ws://{}:{}/session", self.host, self.workspace_port)
    }

    /// Proxy target for a preview request to `port`.
    pub fn preview_url(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }
}

#[derive(Clone)]
pub struct ConnectionResolver {
    provider: Arc<dyn MachineProvider>,
}

impl ConnectionResolver {
    pub fn new(provider: Arc<dyn MachineProvider>) -> Self {
        Self { provider }
    }

    /// Resolve a project's endpoint. The project should be `running`;
    /// callers enforce that before asking.
    pub async fn resolve(&self, project: &ProjectRecord) -> Result<Endpoints, EngineError> {
        let machine_id = project
            .machine_id
            .as_ref()
            .ok_or_else(|| EngineError::Unresolvable("no machine bound".to_string()))?;

        let machine = self.provider.get_machine(machine_id).await?;
        if machine.state != MachineState::Started {
            return Err(EngineError::Unresolvable(format!(
                "machine {} is {}",
                machine_id, machine.state
            )));
        }

        let host = machine
            .host
            .ok_or_else(|| EngineError::Unresolvable("machine has no address".to_string()))?;

        Ok(Endpoints {
            host,
            shell_port: machine.shell_port,
            workspace_port: machine.workspace_port,
        })
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
