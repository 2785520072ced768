// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::http::HeaderValue;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

const SECRET: &str = "test-secret";

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: usize,
}

fn issue(sub: &str, secret: &str) -> String {
    let claims = TestClaims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

#[test]
fn valid_token_yields_user_id() {
    let user = UserId::new();
    let token = issue(&user.to_string(), SECRET);
    assert_eq!(verify_token(SECRET, &token).unwrap(), user);
}

#[test]
fn wrong_secret_is_unauthorized() {
    let token = issue(&UserId::new().to_string(), "other-secret");
    assert!(verify_token(SECRET, &token).is_err());
}

#[test]
fn non_uuid_subject_is_unauthorized() {
    let token = issue("not-a-uuid", SECRET);
    assert!(verify_token(SECRET, &token).is_err());
}

#[test]
fn expired_token_is_unauthorized() {
    let claims = TestClaims {
        sub: UserId::new().to_string(),
        exp: (chrono::Utc::now().timestamp() - 3600) as usize,
    };
    let token =
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
            .unwrap();
    assert!(verify_token(SECRET, &token).is_err());
}

#[yare::parameterized(
    plain        = { "bearer, tok-123",      Some("tok-123") },
    no_space     = { "bearer,tok-123",       Some("tok-123") },
    wrong_lead   = { "graphql-ws, tok-123",  None },
    bare         = { "bearer",               None },
    empty_token  = { "bearer, ",             None },
    empty        = { "",                     None },
)]
fn subprotocol_parsing(value: &str, expected: Option<&str>) {
    assert_eq!(subprotocol_token(value).as_deref(), expected);
}

#[test]
fn header_beats_subprotocol() {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
    headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("bearer, from-subproto"));
    assert_eq!(bearer_token(&headers).as_deref(), Some("from-header"));
}

#[test]
fn subprotocol_fallback_when_no_header() {
    let mut headers = HeaderMap::new();
    headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("bearer, from-subproto"));
    assert_eq!(bearer_token(&headers).as_deref(), Some("from-subproto"));
}

#[test]
fn no_credentials_is_none() {
    assert_eq!(bearer_token(&HeaderMap::new()), None);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
    assert_eq!(bearer_token(&headers), None);
}
