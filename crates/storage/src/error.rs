// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store errors.

use loft_core::UndefinedStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown row, or a row the caller does not own. Ownership failures
    /// collapse into this variant so nothing leaks beyond a 404.
    #[error("not found")]
    NotFound,

    /// Status write outside the legal transition table.
    #[error("illegal status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Status string the vocabulary does not define.
    #[error(transparent)]
    UndefinedStatus(#[from] UndefinedStatus),

    /// Uniqueness or dedup violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persisted value that no longer parses (operator intervention
    /// required; never produced by this codebase).
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}
