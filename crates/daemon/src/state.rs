// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state for both listeners.

use crate::config::{Config, ProviderKind, StoreKind};
use crate::gateway::{proxy_client, ProxyClient};
use loft_adapters::{CloudConfig, CloudProvider, DockerConfig, DockerProvider, MachineProvider};
use loft_core::SystemClock;
use loft_engine::{
    ActivityTracker, ConnectionResolver, EngineConfig, IdleSweeper, InfraManager, Lifecycle, Vault,
};
use loft_storage::{MemStore, PgStore, Store};
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub lifecycle: Lifecycle<SystemClock>,
    pub infra: InfraManager,
    pub resolver: ConnectionResolver,
    pub activity: ActivityTracker<SystemClock>,
    pub vault: Arc<Vault>,
    pub config: Arc<Config>,
    /// Reverse-proxy client for the preview gateway.
    pub proxy: ProxyClient,
}

impl AppState {
    /// Wire the state from configuration: pick the store and provider
    /// backends, then hang the managers off them.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match config.store {
            StoreKind::Pg => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("pg store requires DATABASE_URL"))?;
                Arc::new(PgStore::connect(url).await?)
            }
            StoreKind::Memory => Arc::new(MemStore::new()),
        };

        let provider: Arc<dyn MachineProvider> = match config.provider {
            ProviderKind::Docker => Arc::new(DockerProvider::new(DockerConfig {
                network: config.docker_network.clone(),
                volume_root: config.volume_root.clone(),
            })),
            ProviderKind::Cloud => {
                let token = config
                    .cloud_api_token
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("cloud provider requires an API token"))?;
                Arc::new(
                    CloudProvider::new(CloudConfig {
                        api_url: config.cloud_api_url.clone(),
                        api_token: token,
                        app: config.cloud_app.clone(),
                    })
                    .map_err(|e| anyhow::anyhow!("{e}"))?,
                )
            }
        };

        let engine_config = Arc::new(EngineConfig {
            base_image: config.base_image.clone(),
            default_region: config.default_region.clone(),
            platform_api_key: config.platform_api_key.clone(),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            sweep_page_size: config.sweep_page_size,
            ..EngineConfig::default()
        });
        let vault = Arc::new(Vault::new(&config.encryption_key));
        let clock = SystemClock;

        Ok(Self {
            lifecycle: Lifecycle::new(
                store.clone(),
                provider.clone(),
                vault.clone(),
                engine_config.clone(),
                clock.clone(),
            ),
            infra: InfraManager::new(
                store.clone(),
                provider.clone(),
                vault.clone(),
                engine_config.clone(),
            ),
            resolver: ConnectionResolver::new(provider.clone()),
            activity: ActivityTracker::new(store.clone(), clock.clone()),
            store,
            vault,
            config: Arc::new(config),
            proxy: proxy_client(),
        })
    }

    /// Start the idle sweeper on this state's store/provider pair.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        IdleSweeper::new(
            self.store.clone(),
            self.lifecycle.provider().clone(),
            Arc::new(self.lifecycle.config().clone()),
            self.lifecycle.clock().clone(),
        )
        .spawn()
    }
}
