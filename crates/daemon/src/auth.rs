// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request authentication and the subprotocol smuggle.
//!
//! Bearer tokens are validated against the identity provider's shared
//! secret (HS256); the stable user id rides in `sub`. For WebSocket
//! upgrades, browsers cannot set an `Authorization` header, so the token
//! is conveyed as the second value of `Sec-WebSocket-Protocol: bearer,
//! <token>` and the server echoes `bearer` back during negotiation.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use loft_core::{RequestId, UserId};
use serde::Deserialize;
use tracing::Instrument;

/// Identity and correlation attached to every authenticated request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub user: UserId,
    pub request_id: RequestId,
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Auth middleware: extract → verify → enrich the request.
pub async fn middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let user = verify_token(&state.config.jwt_secret, &token)?;

    let context = RequestContext { user, request_id: RequestId::new() };
    let span = tracing::info_span!(
        "request",
        user_id = %context.user,
        request_id = %context.request_id,
    );
    req.extensions_mut().insert(context);
    Ok(next.run(req).instrument(span).await)
}

/// Token extraction order: `Authorization` header, then the subprotocol
/// smuggle.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .and_then(subprotocol_token)
}

/// Parse `bearer, <token>` from a subprotocol list. Only a list that
/// leads with `bearer` counts.
pub fn subprotocol_token(value: &str) -> Option<String> {
    let mut parts = value.split(',').map(str::trim);
    if parts.next()? != "bearer" {
        return None;
    }
    let token = parts.next()?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Validate a bearer token and extract the user id.
pub fn verify_token(secret: &str, token: &str) -> Result<UserId, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| ApiError::Unauthorized)?;
    data.claims.sub.parse().map_err(|_| ApiError::Unauthorized)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
