// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_port_prefix_token() {
    let parsed = PreviewHost::parse("3000-abcdef12-tok1.preview.example").unwrap();
    assert_eq!(parsed.port, 3000);
    assert_eq!(parsed.prefix, "abcdef12");
    assert_eq!(parsed.token.as_deref(), Some("tok1"));
}

#[test]
fn token_is_optional() {
    let parsed = PreviewHost::parse("8080-deadbeef.preview.example").unwrap();
    assert_eq!(parsed.port, 8080);
    assert_eq!(parsed.prefix, "deadbeef");
    assert_eq!(parsed.token, None);
}

#[test]
fn tcp_port_suffix_ignored() {
    let parsed = PreviewHost::parse("3000-abcdef12.preview.example:8443").unwrap();
    assert_eq!(parsed.port, 3000);
}

#[yare::parameterized(
    empty        = { "" },
    bare_domain  = { "preview.example" },
    no_dot       = { "3000-abcdef12" },
)]
fn rejects_non_preview_hosts(host: &str) {
    assert!(PreviewHost::parse(host).is_err());
}

#[test]
fn rejects_bad_port() {
    let err = PreviewHost::parse("http-abcdef12.preview.example").unwrap_err();
    assert_eq!(err, HostParseError::Port("http".to_string()));
}

#[yare::parameterized(
    short     = { "3000-abc.preview.example", "abc" },
    uppercase = { "3000-ABCDEF12.preview.example", "ABCDEF12" },
    non_hex   = { "3000-zzzzzzzz.preview.example", "zzzzzzzz" },
)]
fn rejects_bad_prefix(host: &str, bad: &str) {
    let err = PreviewHost::parse(host).unwrap_err();
    assert_eq!(err, HostParseError::Prefix(bad.to_string()));
}

#[test]
fn capability_tokens_are_short_hex_and_unique() {
    let a = generate_capability_token();
    let b = generate_capability_token();
    assert_eq!(a.len(), 16);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_ne!(a, b);
}
