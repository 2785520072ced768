// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auxiliary infra manager.
//!
//! Same shape as the project lifecycle with a smaller vocabulary:
//! provisioning is accepted synchronously (`pending`), a detached worker
//! creates the backing machine and lands `ready` or `error`, and the
//! connection details are AEAD-encrypted under the owning project before
//! they touch the database. Reads only surface details once `ready`.

use crate::error::EngineError;
use crate::lifecycle::EngineConfig;
use crate::vault::Vault;
use loft_adapters::{MachineConfig, MachineProvider};
use loft_core::{FieldError, HardwareSpec, MachineState, ProjectId, ServiceId, ServiceStatus};
use loft_storage::{InfraServiceRecord, NewInfraService, ProjectRecord, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Decrypted connection details for a ready service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub url: String,
    /// Env-var seeds (`DATABASE_URL` and friends) for the agent env.
    pub env: BTreeMap<String, String>,
}

/// Catalog entry for a provisionable service type.
struct ServiceSpec {
    image: &'static str,
    port: u16,
    scheme: &'static str,
    username: &'static str,
    database: Option<&'static str>,
    env_var: &'static str,
}

fn service_spec(service_type: &str) -> Option<ServiceSpec> {
    match service_type {
        "postgres" => Some(ServiceSpec {
            image: "postgres:16",
            port: 5432,
            scheme: "postgresql",
            username: "loft",
            database: Some("app"),
            env_var: "DATABASE_URL",
        }),
        "mysql" => Some(ServiceSpec {
            image: "mysql:8",
            port: 3306,
            scheme: "mysql",
            username: "root",
            database: Some("app"),
            env_var: "MYSQL_URL",
        }),
        "redis" => Some(ServiceSpec {
            image: "redis:7",
            port: 6379,
            scheme: "redis",
            username: "default",
            database: None,
            env_var: "REDIS_URL",
        }),
        _ => None,
    }
}

/// Guest env for the service image; the image is expected to honor the
/// conventional bootstrap variables.
fn guest_env(service_type: &str, spec: &ServiceSpec, password: &str) -> Vec<(String, String)> {
    match service_type {
        "postgres" => vec![
            ("POSTGRES_USER".to_string(), spec.username.to_string()),
            ("POSTGRES_PASSWORD".to_string(), password.to_string()),
            ("POSTGRES_DB".to_string(), "app".to_string()),
        ],
        "mysql" => vec![
            ("MYSQL_ROOT_PASSWORD".to_string(), password.to_string()),
            ("MYSQL_DATABASE".to_string(), "app".to_string()),
        ],
        "redis" => vec![("REDIS_PASSWORD".to_string(), password.to_string())],
        _ => Vec::new(),
    }
}

#[derive(Clone)]
pub struct InfraManager {
    store: Arc<dyn Store>,
    provider: Arc<dyn MachineProvider>,
    vault: Arc<Vault>,
    config: Arc<EngineConfig>,
}

impl InfraManager {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn MachineProvider>,
        vault: Arc<Vault>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self { store, provider, vault, config }
    }

    /// Accept a provision request. Dedup: an existing service of the same
    /// type that is neither `error` nor `deleted` is returned to internal
    /// callers and a conflict to external ones.
    pub async fn provision(
        &self,
        project: &ProjectRecord,
        service_type: &str,
        internal: bool,
    ) -> Result<InfraServiceRecord, EngineError> {
        let Some(_) = service_spec(service_type) else {
            return Err(EngineError::Validation(vec![FieldError::new(
                "service_type",
                format!("unknown service type {service_type:?}"),
            )]));
        };

        if let Some(existing) =
            self.store.active_service_of_type(project.id, service_type).await?
        {
            if internal {
                return Ok(existing);
            }
            return Err(EngineError::Conflict(format!(
                "a {service_type} service already exists for this project"
            )));
        }

        let record = self
            .store
            .create_service(NewInfraService {
                project_id: project.id,
                service_type: service_type.to_string(),
                name: format!("{}-{}", service_type, project.id.prefix8()),
            })
            .await?;

        let worker = self.clone();
        let id = record.id;
        let project_id = project.id;
        let service_type = service_type.to_string();
        tokio::spawn(async move {
            if let Err(e) = worker.provision_worker(id, project_id, &service_type).await {
                tracing::error!(service_id = %id, error = %e, "provision worker failed");
                if let Err(te) =
                    worker.store.transition_service(id, "error", Some(&e.to_string())).await
                {
                    tracing::warn!(service_id = %id, error = %te, "could not record error status");
                }
            }
        });

        Ok(record)
    }

    /// Fetch a service; connection details are decrypted only when the
    /// service is `ready`.
    pub async fn get(
        &self,
        project: ProjectId,
        id: ServiceId,
    ) -> Result<(InfraServiceRecord, Option<ConnectionDetails>), EngineError> {
        let record = self.store.get_service(project, id).await?;
        let details = self.connection(&record)?;
        Ok((record, details))
    }

    /// Decrypt a record's connection details; `None` unless `ready`.
    pub fn connection(
        &self,
        record: &InfraServiceRecord,
    ) -> Result<Option<ConnectionDetails>, EngineError> {
        match (&record.status, &record.connection_ciphertext) {
            (ServiceStatus::Ready, Some(ciphertext)) => {
                Ok(Some(self.decrypt_details(record.project_id, ciphertext)?))
            }
            _ => Ok(None),
        }
    }

    pub async fn list(&self, project: ProjectId) -> Result<Vec<InfraServiceRecord>, EngineError> {
        Ok(self.store.list_services(project).await?)
    }

    /// Idempotent delete: the machine teardown is best-effort and the
    /// row moves to `deleted`; repeating the call is a no-op.
    pub async fn delete(&self, project: ProjectId, id: ServiceId) -> Result<(), EngineError> {
        let record = self.store.get_service(project, id).await?;
        if record.status == ServiceStatus::Deleted {
            return Ok(());
        }

        if let Some(machine) = &record.machine_id {
            if let Err(e) = self.provider.delete_machine(machine).await {
                tracing::warn!(service_id = %id, machine_id = %machine, error = %e,
                    "service machine delete failed, marking deleted anyway");
            }
        }

        self.store.transition_service(id, "deleted", None).await?;
        tracing::info!(service_id = %id, "service deleted");
        Ok(())
    }

    async fn provision_worker(
        &self,
        id: ServiceId,
        project: ProjectId,
        service_type: &str,
    ) -> Result<(), EngineError> {
        let Some(spec) = service_spec(service_type) else {
            // Catalog entries never disappear between accept and worker.
            return Err(EngineError::Conflict(format!("unknown service type: {service_type}")));
        };

        let password = uuid::Uuid::new_v4().simple().to_string();
        let hardware = HardwareSpec::preset("basic").ok_or_else(|| {
            EngineError::Validation(vec![FieldError::new("hardware", "missing basic preset")])
        })?;

        let machine = self
            .provider
            .create_machine(
                MachineConfig::new(
                    format!("{}-svc-{}", self.config.machine_name_prefix, id),
                    spec.image,
                    hardware,
                )
                .region(self.config.default_region.clone())
                .env(guest_env(service_type, &spec, &password)),
            )
            .await?;
        self.store.set_service_machine_id(id, &machine.id).await?;

        self.provider
            .wait_for_state(&machine.id, MachineState::Started, self.config.start_timeout)
            .await?;

        let refreshed = self.provider.get_machine(&machine.id).await?;
        let host = refreshed
            .host
            .ok_or_else(|| EngineError::Unresolvable("service machine has no address".to_string()))?;

        let details = build_details(&spec, host, &password);
        let ciphertext = self.encrypt_details(project, &details)?;
        self.store.set_service_ready(id, &ciphertext).await?;
        tracing::info!(service_id = %id, "service ready");
        Ok(())
    }

    fn encrypt_details(
        &self,
        project: ProjectId,
        details: &ConnectionDetails,
    ) -> Result<String, EngineError> {
        let plaintext = serde_json::to_vec(details)
            .map_err(|e| EngineError::Crypto(format!("details encoding: {e}")))?;
        self.vault.encrypt(&project.to_string(), &plaintext)
    }

    fn decrypt_details(
        &self,
        project: ProjectId,
        ciphertext: &str,
    ) -> Result<ConnectionDetails, EngineError> {
        let plaintext = self.vault.decrypt(&project.to_string(), ciphertext)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| EngineError::Crypto(format!("details decoding: {e}")))
    }
}

fn build_details(spec: &ServiceSpec, host: String, password: &str) -> ConnectionDetails {
    let auth = format!("{}:{}", spec.username, password);
    let url = match spec.database {
        Some(db) => format!("{}://{}@{}:{}/{}", spec.scheme, auth, host, spec.port, db),
        None => format!("{}://{}@{}:{}", spec.scheme, auth, host, spec.port),
    };
    let mut env = BTreeMap::new();
    env.insert(spec.env_var.to_string(), url.clone());
    ConnectionDetails {
        host,
        port: spec.port,
        username: spec.username.to_string(),
        password: password.to_string(),
        database: spec.database.map(str::to_string),
        url,
        env,
    }
}

#[cfg(test)]
#[path = "infra_tests.rs"]
mod tests;
