// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status vocabularies and legal transitions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// A status string the store refuses to persist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("undefined status: {0:?}")]
pub struct UndefinedStatus(pub String);

/// Lifecycle state of a project.
///
/// Transitions are driven by request handlers (synchronous edge into
/// `Starting`/`Stopping`), async workers (outcome edges), and the idle
/// sweeper. Anything outside [`ProjectStatus::can_transition`] is a
/// programming error the store rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

crate::simple_display! {
    ProjectStatus {
        Stopped => "stopped",
        Starting => "starting",
        Running => "running",
        Stopping => "stopping",
        Error => "error",
    }
}

impl FromStr for ProjectStatus {
    type Err = UndefinedStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "error" => Ok(Self::Error),
            other => Err(UndefinedStatus(other.to_string())),
        }
    }
}

impl ProjectStatus {
    /// Whether `self → to` is a legal edge of the project state machine.
    ///
    /// ```text
    /// stopped   → starting
    /// starting  → running | error
    /// running   → stopping | error
    /// stopping  → stopped | error
    /// error     → starting
    /// ```
    pub fn can_transition(self, to: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Error)
                | (Running, Stopping)
                | (Running, Error)
                | (Stopping, Stopped)
                | (Stopping, Error)
                | (Error, Starting)
        )
    }

    /// States from which a `Start` request is accepted.
    pub fn startable(self) -> bool {
        matches!(self, ProjectStatus::Stopped | ProjectStatus::Error)
    }
}

/// Lifecycle state of an auxiliary infra service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Pending,
    Ready,
    Error,
    Deleted,
}

crate::simple_display! {
    ServiceStatus {
        Pending => "pending",
        Ready => "ready",
        Error => "error",
        Deleted => "deleted",
    }
}

impl FromStr for ServiceStatus {
    type Err = UndefinedStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            "deleted" => Ok(Self::Deleted),
            other => Err(UndefinedStatus(other.to_string())),
        }
    }
}

impl ServiceStatus {
    /// A service in this state blocks re-provisioning of its type.
    pub fn occupies_type(self) -> bool {
        !matches!(self, ServiceStatus::Error | ServiceStatus::Deleted)
    }

    /// Whether `self → to` is a legal edge of the service state machine
    /// (`pending → ready | error`, `ready → error`, anything → `deleted`,
    /// `deleted` terminal).
    pub fn can_transition(self, to: ServiceStatus) -> bool {
        use ServiceStatus::*;
        matches!(
            (self, to),
            (Pending, Ready)
                | (Pending, Error)
                | (Ready, Error)
                | (Pending, Deleted)
                | (Ready, Deleted)
                | (Error, Deleted)
        )
    }
}

/// Normalized machine state vocabulary.
///
/// Providers map their native vocabulary onto this set; the lifecycle
/// manager only ever reasons about these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
    Destroyed,
}

crate::simple_display! {
    MachineState {
        Created => "created",
        Starting => "starting",
        Started => "started",
        Stopping => "stopping",
        Stopped => "stopped",
        Destroyed => "destroyed",
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
