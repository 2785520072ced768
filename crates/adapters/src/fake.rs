// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake provider for tests: scripted states, recorded calls.

use crate::{
    Machine, MachineConfig, MachineProvider, ProviderError, VolumeConfig, GUEST_SHELL_PORT,
    GUEST_WORKSPACE_PORT,
};
use async_trait::async_trait;
use loft_core::{MachineId, MachineState, VolumeId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct FakeState {
    machines: HashMap<MachineId, Machine>,
    volumes: Vec<VolumeId>,
    calls: Vec<String>,
    fail_next: HashMap<&'static str, ProviderError>,
    /// State newly created machines report until told otherwise.
    create_state: Option<MachineState>,
    /// Endpoint newly created machines report (tests that stand up a
    /// real listener to act as the guest).
    endpoint: Option<(String, u16, u16)>,
}

/// In-memory [`MachineProvider`] double.
///
/// Machines move to `started` on create/start and `stopped` on stop
/// unless a state has been scripted. Every operation is recorded for
/// assertion, and any operation can be made to fail once.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
    counter: Arc<AtomicU32>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation and pop any scripted failure for it.
    fn begin(&self, op: &'static str, detail: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(format!("{op}({detail})"));
        match state.fail_next.remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Make the next call to `op` fail with `err`.
    pub fn fail_next(&self, op: &'static str, err: ProviderError) {
        self.state.lock().fail_next.insert(op, err);
    }

    /// Newly created machines report this state (default: `started`).
    pub fn set_create_state(&self, state: MachineState) {
        self.state.lock().create_state = Some(state);
    }

    /// Newly created machines report this host and port pair instead of
    /// the synthetic defaults.
    pub fn set_endpoint(&self, host: &str, shell_port: u16, workspace_port: u16) {
        self.state.lock().endpoint = Some((host.to_string(), shell_port, workspace_port));
    }

    /// Overwrite a machine's reported state.
    pub fn set_state(&self, id: &MachineId, machine_state: MachineState) {
        if let Some(machine) = self.state.lock().machines.get_mut(id) {
            machine.state = machine_state;
        }
    }

    pub fn machine_state(&self, id: &MachineId) -> Option<MachineState> {
        self.state.lock().machines.get(id).map(|m| m.state)
    }

    pub fn machine_count(&self) -> usize {
        self.state.lock().machines.len()
    }

    pub fn volume_count(&self) -> usize {
        self.state.lock().volumes.len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl MachineProvider for FakeProvider {
    async fn create_machine(&self, config: MachineConfig) -> Result<Machine, ProviderError> {
        self.begin("create_machine", &config.name)?;
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.lock();
        let (host, shell_port, workspace_port) = state
            .endpoint
            .clone()
            .unwrap_or_else(|| (format!("10.0.0.{n}"), GUEST_SHELL_PORT, GUEST_WORKSPACE_PORT));
        let machine = Machine {
            id: MachineId::from(format!("fm-{n}")),
            state: state.create_state.unwrap_or(MachineState::Started),
            host: Some(host),
            shell_port,
            workspace_port,
        };
        state.machines.insert(machine.id.clone(), machine.clone());
        Ok(machine)
    }

    async fn get_machine(&self, id: &MachineId) -> Result<Machine, ProviderError> {
        self.begin("get_machine", id.as_str())?;
        self.state
            .lock()
            .machines
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn start_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        self.begin("start_machine", id.as_str())?;
        let mut state = self.state.lock();
        let machine = state
            .machines
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        machine.state = MachineState::Started;
        Ok(())
    }

    async fn stop_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        self.begin("stop_machine", id.as_str())?;
        let mut state = self.state.lock();
        let machine = state
            .machines
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        machine.state = MachineState::Stopped;
        Ok(())
    }

    async fn delete_machine(&self, id: &MachineId) -> Result<(), ProviderError> {
        self.begin("delete_machine", id.as_str())?;
        self.state
            .lock()
            .machines
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn create_volume(&self, config: VolumeConfig) -> Result<VolumeId, ProviderError> {
        self.begin("create_volume", &config.name)?;
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let volume = VolumeId::from(format!("vol-{n}"));
        self.state.lock().volumes.push(volume.clone());
        Ok(volume)
    }

    async fn delete_volume(&self, id: &VolumeId) -> Result<(), ProviderError> {
        self.begin("delete_volume", id.as_str())?;
        self.state.lock().volumes.retain(|v| v != id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
