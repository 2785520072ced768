// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn roundtrip() {
    let vault = Vault::new("master-secret");
    let ciphertext = vault.encrypt("scope-a", b"hello").unwrap();
    let plaintext = vault.decrypt("scope-a", &ciphertext).unwrap();
    assert_eq!(plaintext, b"hello");
}

#[test]
fn ciphertext_is_bound_to_its_scope() {
    let vault = Vault::new("master-secret");
    let ciphertext = vault.encrypt("project-a", b"secret").unwrap();
    assert!(vault.decrypt("project-b", &ciphertext).is_err());
}

#[test]
fn wrong_master_secret_fails() {
    let vault = Vault::new("master-secret");
    let other = Vault::new("different-secret");
    let ciphertext = vault.encrypt("scope", b"secret").unwrap();
    assert!(other.decrypt("scope", &ciphertext).is_err());
}

#[test]
fn nonces_differ_between_encryptions() {
    let vault = Vault::new("master-secret");
    let a = vault.encrypt("scope", b"same plaintext").unwrap();
    let b = vault.encrypt("scope", b"same plaintext").unwrap();
    assert_ne!(a, b);
}

#[test]
fn tampered_ciphertext_rejected() {
    let vault = Vault::new("master-secret");
    let ciphertext = vault.encrypt("scope", b"secret").unwrap();
    let mut tampered = ciphertext.into_bytes();
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();
    assert!(vault.decrypt("scope", &tampered).is_err());
}

#[test]
fn garbage_input_rejected() {
    let vault = Vault::new("master-secret");
    assert!(vault.decrypt("scope", "not base64 at all!!").is_err());
    assert!(vault.decrypt("scope", "AAAA").is_err());
}
