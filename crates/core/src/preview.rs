// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview host parsing and capability tokens.
//!
//! Preview traffic addresses a project through its Host header:
//! `{port}-{prefix8}[-{token}].{base-domain}`. The prefix is the first 8
//! lowercase hex characters of the project id; the token gates non-public
//! projects.

use thiserror::Error;

/// Parsed form of a preview Host header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewHost {
    /// Guest port the request targets.
    pub port: u16,
    /// First 8 hex chars of the project id.
    pub prefix: String,
    /// Capability token embedded in the subdomain, if any.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostParseError {
    #[error("missing Host header")]
    Missing,
    #[error("host does not match the preview format")]
    Format,
    #[error("invalid port in preview host: {0:?}")]
    Port(String),
    #[error("invalid project prefix in preview host: {0:?}")]
    Prefix(String),
}

impl PreviewHost {
    /// Parse a Host header value. The TCP port suffix (`:8080`) is ignored;
    /// only the leftmost DNS label is inspected.
    pub fn parse(host: &str) -> Result<Self, HostParseError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(HostParseError::Missing);
        }

        let name = host.split(':').next().unwrap_or_default();
        let label = name.split('.').next().unwrap_or_default();
        if label.is_empty() || label == name {
            // No dot at all means no base domain under us.
            return Err(HostParseError::Format);
        }

        let mut parts = label.splitn(3, '-');
        let port_part = parts.next().unwrap_or_default();
        let prefix_part = parts.next().ok_or(HostParseError::Format)?;
        let token = parts.next().filter(|t| !t.is_empty()).map(str::to_string);

        let port: u16 = port_part
            .parse()
            .map_err(|_| HostParseError::Port(port_part.to_string()))?;

        if prefix_part.len() != 8
            || !prefix_part.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(HostParseError::Prefix(prefix_part.to_string()));
        }

        Ok(PreviewHost { port, prefix: prefix_part.to_string(), token })
    }
}

/// Generate a fresh capability token: 16 lowercase hex characters, short
/// enough to ride in a DNS label.
pub fn generate_capability_token() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    simple.chars().take(16).collect()
}

#[cfg(test)]
#[path = "preview_tests.rs"]
mod tests;
