// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine errors.

use loft_adapters::ProviderError;
use loft_core::FieldError;
use loft_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Request is structurally fine but the current state forbids it
    /// (start while running, duplicate service type, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    /// Project has no reachable endpoint (no machine bound, or the
    /// provider has not assigned an address yet).
    #[error("cannot resolve connection: {0}")]
    Unresolvable(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_not_found())
    }
}
