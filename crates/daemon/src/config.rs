// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Everything arrives as a flag with an env fallback; the binary fails
//! fast on the combinations that cannot work (pg store without a
//! database URL, cloud provider without a token, missing encryption or
//! JWT secret).

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Pg,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Docker,
    Cloud,
}

/// `loftd` command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "loftd", about = "Loft control plane daemon")]
pub struct Config {
    /// Address of the authenticated API listener.
    #[arg(long, env = "LOFT_API_ADDR", default_value = "0.0.0.0:8080")]
    pub api_addr: SocketAddr,

    /// Address of the preview gateway listener.
    #[arg(long, env = "LOFT_PREVIEW_ADDR", default_value = "0.0.0.0:8081")]
    pub preview_addr: SocketAddr,

    /// Store backend.
    #[arg(long, env = "LOFT_STORE", value_enum, default_value = "pg")]
    pub store: StoreKind,

    /// Postgres connection string (required for the pg store).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Provider backend.
    #[arg(long, env = "LOFT_PROVIDER", value_enum, default_value = "docker")]
    pub provider: ProviderKind,

    /// Docker: bridge network for project containers.
    #[arg(long, env = "LOFT_DOCKER_NETWORK", default_value = "loft-net")]
    pub docker_network: String,

    /// Docker: root directory for project volumes.
    #[arg(long, env = "LOFT_VOLUME_ROOT", default_value = "/var/lib/loft/volumes")]
    pub volume_root: PathBuf,

    /// Cloud: machines API base URL.
    #[arg(long, env = "LOFT_CLOUD_API_URL", default_value = "https://api.machines.dev")]
    pub cloud_api_url: String,

    /// Cloud: machines API token (required for the cloud provider).
    #[arg(long, env = "LOFT_CLOUD_API_TOKEN")]
    pub cloud_api_token: Option<String>,

    /// Cloud: application namespace machines are created under.
    #[arg(long, env = "LOFT_CLOUD_APP", default_value = "loft")]
    pub cloud_app: String,

    /// Shared secret bearer tokens are validated against.
    #[arg(long, env = "LOFT_JWT_SECRET")]
    pub jwt_secret: String,

    /// Master secret for the AEAD vault.
    #[arg(long, env = "LOFT_ENCRYPTION_KEY")]
    pub encryption_key: String,

    /// Platform API key exported to agents (user keys override it).
    #[arg(long, env = "LOFT_PLATFORM_API_KEY")]
    pub platform_api_key: Option<String>,

    /// Guest image for new projects.
    #[arg(long, env = "LOFT_BASE_IMAGE", default_value = "loft-base:latest")]
    pub base_image: String,

    /// Default region for machines without an accelerator.
    #[arg(long, env = "LOFT_DEFAULT_REGION", default_value = "sjc")]
    pub default_region: String,

    /// Base domain the preview gateway serves under.
    #[arg(long, env = "LOFT_PREVIEW_DOMAIN", default_value = "preview.localhost")]
    pub preview_domain: String,

    /// Externally visible URL of the API listener (terminal URLs).
    #[arg(long, env = "LOFT_PUBLIC_URL", default_value = "http://localhost:8080")]
    pub public_url: String,

    /// Idle sweeper interval in seconds.
    #[arg(long, env = "LOFT_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Idle sweeper page size.
    #[arg(long, env = "LOFT_SWEEP_PAGE_SIZE", default_value_t = 100)]
    pub sweep_page_size: i64,
}

impl Config {
    /// Validate the fatal combinations up front.
    pub fn validate(&self) -> Result<(), String> {
        if self.store == StoreKind::Pg && self.database_url.is_none() {
            return Err("pg store requires --database-url / DATABASE_URL".to_string());
        }
        if self.provider == ProviderKind::Cloud && self.cloud_api_token.is_none() {
            return Err(
                "cloud provider requires --cloud-api-token / LOFT_CLOUD_API_TOKEN".to_string()
            );
        }
        if self.jwt_secret.is_empty() {
            return Err("--jwt-secret / LOFT_JWT_SECRET must not be empty".to_string());
        }
        if self.encryption_key.is_empty() {
            return Err("--encryption-key / LOFT_ENCRYPTION_KEY must not be empty".to_string());
        }
        Ok(())
    }

    /// URL the browser opens a workspace session against.
    pub fn terminal_url(&self, project: loft_core::ProjectId) -> String {
        format!("{}/projects/{}/workspace", self.public_url, project)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
