// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User API key storage and env mapping.
//!
//! The persisted ciphertext decodes to a map of provider name to key
//! entry. Plaintext exists only inside the request that reads or writes
//! it and inside the environment-build step of a worker or bridge.

use crate::error::EngineError;
use crate::vault::Vault;
use chrono::{DateTime, Utc};
use loft_core::UserId;
use loft_storage::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredApiKey {
    pub key: String,
    pub added_at: DateTime<Utc>,
}

/// Provider name → key entry.
pub type ApiKeyMap = BTreeMap<String, StoredApiKey>;

/// Conventional env name for a provider's key.
pub fn env_name(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "gemini" => Some("GEMINI_API_KEY"),
        _ => None,
    }
}

/// Encrypt a key map for a user (scope = user id).
pub fn encrypt_map(vault: &Vault, user: UserId, map: &ApiKeyMap) -> Result<String, EngineError> {
    let plaintext = serde_json::to_vec(map)
        .map_err(|e| EngineError::Crypto(format!("key map encoding: {e}")))?;
    vault.encrypt(&user.to_string(), &plaintext)
}

/// Decrypt a user's key map.
pub fn decrypt_map(
    vault: &Vault,
    user: UserId,
    ciphertext: &str,
) -> Result<ApiKeyMap, EngineError> {
    let plaintext = vault.decrypt(&user.to_string(), ciphertext)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| EngineError::Crypto(format!("key map decoding: {e}")))
}

/// Fetch and decrypt a user's keys as env pairs under their conventional
/// names. Unknown provider names are skipped.
pub async fn env_pairs(
    store: &dyn Store,
    vault: &Vault,
    user: UserId,
) -> Result<Vec<(String, String)>, EngineError> {
    let Some(ciphertext) = store.get_api_keys_ciphertext(user).await? else {
        return Ok(Vec::new());
    };
    let map = decrypt_map(vault, user, &ciphertext)?;
    Ok(map
        .into_iter()
        .filter_map(|(provider, entry)| {
            env_name(&provider).map(|name| (name.to_string(), entry.key))
        })
        .collect())
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
