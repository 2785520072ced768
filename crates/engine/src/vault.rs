// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AEAD vault for secrets at rest.
//!
//! Ciphertext layout is `base64(nonce || aes-256-gcm ciphertext)`. The
//! per-scope key is derived from the process master secret and the scope
//! string (a project or user id), and the scope doubles as the AEAD
//! associated data, so a ciphertext only ever decrypts under the row it
//! was written for. Rotating the master secret requires re-encrypting in
//! place.

use crate::error::EngineError;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine as _;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Process-wide secret box.
pub struct Vault {
    master: [u8; 32],
}

impl Vault {
    pub fn new(master_secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(master_secret.as_bytes());
        Self { master: hasher.finalize().into() }
    }

    fn key_for(&self, scope: &str) -> Key<Aes256Gcm> {
        let mut hasher = Sha256::new();
        hasher.update(self.master);
        hasher.update(scope.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        *Key::<Aes256Gcm>::from_slice(&digest)
    }

    pub fn encrypt(&self, scope: &str, plaintext: &[u8]) -> Result<String, EngineError> {
        let cipher = Aes256Gcm::new(&self.key_for(scope));
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, Payload { msg: plaintext, aad: scope.as_bytes() })
            .map_err(|_| EngineError::Crypto("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(out))
    }

    pub fn decrypt(&self, scope: &str, encoded: &str) -> Result<Vec<u8>, EngineError> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| EngineError::Crypto(format!("bad ciphertext encoding: {e}")))?;
        if raw.len() < NONCE_LEN {
            return Err(EngineError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(&self.key_for(scope));
        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload { msg: ciphertext, aad: scope.as_bytes() },
            )
            .map_err(|_| EngineError::Crypto("decryption failed".to_string()))
    }
}

#[cfg(test)]
#[path = "vault_tests.rs"]
mod tests;
