//! Tenant-aware credential resolution.
//!
//! Every request needs an API key and a model id before it can reach the
//! inference service. Both come from a fixed precedence chain that encodes
//! the operational story: operators can force a fleet-wide key, an
//! administrator's per-tenant key supersedes the trial defaults, and an
//! interactive request may override the model id for experimentation but
//! never the API key.
//!
//! Precedence (fixed): global override, then active-trial default, then
//! per-tenant secret store, then failure.

mod error;

pub use error::{ResolveError, SecretStoreError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::secret::Secret;

/// Opaque identifier of a paying organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A plan the user is enrolled in.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanMembership {
    pub name: String,
    pub started_at: DateTime<Utc>,
    /// Absent means the plan never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlanMembership {
    pub fn is_active(&self) -> bool {
        self.expires_at.is_none_or(|expires| expires > Utc::now())
    }

    pub fn is_trial(&self) -> bool {
        self.name.to_lowercase().contains("trial")
    }
}

/// The requesting user, as produced by the auth collaborator. Read-only
/// from the pipeline's point of view.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub tenant_id: Option<TenantId>,
    pub plans: Vec<PlanMembership>,
    /// Commercial-seat override from the subscription system. A commercial
    /// user is never treated as a trial user.
    pub is_commercial: bool,
}

impl UserIdentity {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            tenant_id: None,
            plans: Vec::new(),
            is_commercial: false,
        }
    }

    pub fn has_active_trial(&self) -> bool {
        !self.is_commercial && self.plans.iter().any(|p| p.is_trial() && p.is_active())
    }
}

/// Which per-tenant entry to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSuffix {
    ApiKey,
    ModelId,
}

impl SecretSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretSuffix::ApiKey => "api_key",
            SecretSuffix::ModelId => "model_id",
        }
    }
}

/// Read-only view of the external secret store.
///
/// The store implementation lives outside the core and handles its own
/// concurrency; the pipeline only ever reads.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(
        &self,
        tenant: TenantId,
        suffix: SecretSuffix,
    ) -> Result<Option<Secret>, SecretStoreError>;

    async fn exists(
        &self,
        tenant: TenantId,
        suffix: SecretSuffix,
    ) -> Result<bool, SecretStoreError> {
        Ok(self.get(tenant, suffix).await?.is_some())
    }
}

/// Store for variants that never consult per-tenant secrets (on-prem,
/// plain HTTP): every lookup reports absent, so only the configured
/// overrides can resolve.
pub struct DisabledSecretStore;

#[async_trait]
impl SecretStore for DisabledSecretStore {
    async fn get(
        &self,
        _tenant: TenantId,
        _suffix: SecretSuffix,
    ) -> Result<Option<Secret>, SecretStoreError> {
        Ok(None)
    }

    async fn exists(
        &self,
        _tenant: TenantId,
        _suffix: SecretSuffix,
    ) -> Result<bool, SecretStoreError> {
        Ok(false)
    }
}

/// Fleet-provided defaults handed to users on an active trial plan.
#[derive(Debug, Clone)]
pub struct TrialDefaults {
    pub api_key: Secret,
    pub model_id: String,
}

/// Resolves `(user, tenant)` to an API key and a model id.
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
    global_api_key: Option<Secret>,
    global_model_id: Option<String>,
    /// `Some` iff trials are enabled for this deployment.
    trial: Option<TrialDefaults>,
}

impl CredentialResolver {
    pub fn new(
        store: Arc<dyn SecretStore>,
        global_api_key: Option<Secret>,
        global_model_id: Option<String>,
        trial: Option<TrialDefaults>,
    ) -> Self {
        Self {
            store,
            global_api_key,
            global_model_id,
            trial,
        }
    }

    /// The tenant the request acts on behalf of: an explicit tenant wins,
    /// otherwise the user's own tenant.
    fn effective_tenant(user: &UserIdentity, tenant_id: Option<TenantId>) -> Option<TenantId> {
        tenant_id.or(user.tenant_id)
    }

    async fn tenant_has_api_key(&self, tenant: Option<TenantId>) -> Result<bool, SecretStoreError> {
        match tenant {
            Some(tenant) => self.store.exists(tenant, SecretSuffix::ApiKey).await,
            None => Ok(false),
        }
    }

    /// Resolve the API key for a request.
    pub async fn resolve_api_key(
        &self,
        user: &UserIdentity,
        tenant_id: Option<TenantId>,
    ) -> Result<Secret, ResolveError> {
        let tenant = Self::effective_tenant(user, tenant_id);

        if let Some(key) = &self.global_api_key {
            return Ok(key.clone());
        }

        let tenant = tenant.ok_or(ResolveError::KeyNotFound)?;

        if let Some(trial) = &self.trial {
            // Existence check only: the trial path must not read the value.
            if user.has_active_trial() && !self.store.exists(tenant, SecretSuffix::ApiKey).await? {
                return Ok(trial.api_key.clone());
            }
        }

        match self.store.get(tenant, SecretSuffix::ApiKey).await? {
            Some(secret) => Ok(secret),
            None => Err(ResolveError::KeyNotFound),
        }
    }

    /// Resolve the model id for a request. `requested` is the caller's
    /// interactive override and wins over the org default, but not over an
    /// active trial.
    pub async fn resolve_model_id(
        &self,
        user: &UserIdentity,
        tenant_id: Option<TenantId>,
        requested: Option<&str>,
    ) -> Result<String, ResolveError> {
        let tenant = Self::effective_tenant(user, tenant_id);

        if let Some(trial) = &self.trial {
            if user.has_active_trial() && !self.tenant_has_api_key(tenant).await? {
                return Ok(trial.model_id.clone());
            }
        }

        if let Some(requested) = requested.filter(|m| !m.is_empty()) {
            return Ok(requested.to_string());
        }

        if let Some(model_id) = &self.global_model_id {
            return Ok(model_id.clone());
        }

        let tenant = tenant.ok_or(ResolveError::NoDefaultModelId)?;
        match self.store.get(tenant, SecretSuffix::ModelId).await? {
            Some(value) => Ok(value.expose().to_string()),
            None => Err(ResolveError::ModelIdNotFound),
        }
    }
}
