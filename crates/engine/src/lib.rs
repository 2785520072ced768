// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loft-engine: the lifecycle layer between the HTTP surface and the
//! store/provider pair.
//!
//! Request handlers call into [`Lifecycle`] and [`InfraManager`], which
//! flip the synchronous status edge and hand the slow work to detached
//! workers. The [`IdleSweeper`] ticks in the background, the
//! [`ConnectionResolver`] turns a project into a reachable endpoint, and
//! the [`Vault`]/[`ActivityTracker`] pair carries the crypto and
//! activity-metering concerns shared by the daemon.

pub mod activity;
pub mod error;
pub mod infra;
pub mod keys;
pub mod lifecycle;
pub mod resolver;
pub mod sweeper;
pub mod vault;

pub use activity::ActivityTracker;
pub use error::EngineError;
pub use infra::{ConnectionDetails, InfraManager};
pub use keys::{ApiKeyMap, StoredApiKey};
pub use lifecycle::{EngineConfig, Lifecycle};
pub use resolver::{ConnectionResolver, Endpoints};
pub use sweeper::IdleSweeper;
pub use vault::Vault;
