// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent environment assembly.
//!
//! The environment handed to a workspace VM is the union of the project
//! coordinates, the user's stored API keys, the platform key, SDK aliases,
//! and the correlation trio. Precedence (low to high): platform defaults,
//! user keys, per-call extras. Aliases only fill names that are still
//! absent after every source has been applied.

use crate::id::{ProjectId, RequestId, UserId};
use base64::Engine as _;
use std::collections::BTreeMap;

/// Header prefix for smuggling the environment through the upstream
/// WebSocket dial. Values are base64 so they survive header normalization
/// and may contain any bytes.
pub const ENV_HEADER_PREFIX: &str = "X-Agent-Env-";

/// Env names a second SDK expects, filled from the conventional name when
/// the conventional name is present and the alias is not.
const SDK_ALIASES: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "OPENAI_KEY"),
    ("GEMINI_API_KEY", "GOOGLE_GENERATIVE_AI_API_KEY"),
];

/// Request/user/project correlation trio, exported when available.
#[derive(Debug, Clone, Copy)]
pub struct Correlation {
    pub request_id: RequestId,
    pub user_id: UserId,
    pub project_id: ProjectId,
}

/// Fully assembled agent environment.
///
/// Backed by a sorted map so iteration (and the header set derived from
/// it) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentEnv {
    vars: BTreeMap<String, String>,
}

impl AgentEnv {
    pub fn builder(project_id: ProjectId) -> AgentEnvBuilder {
        AgentEnvBuilder {
            project_id,
            storage_dir: "/home/user/storage".to_string(),
            project_cwd: "/home/user/project".to_string(),
            platform_key: None,
            user_keys: Vec::new(),
            extras: Vec::new(),
            correlation: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Owned pairs, for provider configs that take `Vec<(String, String)>`.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Render as `X-Agent-Env-<NAME>: base64(<value>)` header pairs for the
    /// upstream dial.
    pub fn to_headers(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| {
                let name = format!("{ENV_HEADER_PREFIX}{k}");
                let value = base64::engine::general_purpose::STANDARD.encode(v.as_bytes());
                (name, value)
            })
            .collect()
    }
}

/// Builder for [`AgentEnv`]; see the module docs for precedence.
#[derive(Debug, Clone)]
pub struct AgentEnvBuilder {
    project_id: ProjectId,
    storage_dir: String,
    project_cwd: String,
    platform_key: Option<String>,
    user_keys: Vec<(String, String)>,
    extras: Vec<(String, String)>,
    correlation: Option<Correlation>,
}

impl AgentEnvBuilder {
    crate::setters! {
        into {
            storage_dir: String,
            project_cwd: String,
        }
        set {
            user_keys: Vec<(String, String)>,
            extras: Vec<(String, String)>,
        }
        option {
            platform_key: String,
            correlation: Correlation,
        }
    }

    pub fn build(self) -> AgentEnv {
        let mut vars = BTreeMap::new();

        vars.insert("PROJECT_ID".to_string(), self.project_id.to_string());
        vars.insert("STORAGE_DIR".to_string(), self.storage_dir);
        vars.insert("PROJECT_CWD".to_string(), self.project_cwd);

        // Platform key powers the agent by default; a user key of the same
        // name wins below.
        if let Some(key) = self.platform_key {
            vars.insert("ANTHROPIC_API_KEY".to_string(), key);
        }

        for (name, value) in self.user_keys {
            vars.insert(name, value);
        }

        for (name, value) in self.extras {
            vars.insert(name, value);
        }

        for (from, to) in SDK_ALIASES {
            if let Some(value) = vars.get(*from).cloned() {
                vars.entry((*to).to_string()).or_insert(value);
            }
        }

        if let Some(c) = self.correlation {
            vars.insert("CORRELATION_REQUEST_ID".to_string(), c.request_id.to_string());
            vars.insert("CORRELATION_USER_ID".to_string(), c.user_id.to_string());
            vars.insert("CORRELATION_PROJECT_ID".to_string(), c.project_id.to_string());
        }

        AgentEnv { vars }
    }
}

#[cfg(test)]
#[path = "agent_env_tests.rs"]
mod tests;
