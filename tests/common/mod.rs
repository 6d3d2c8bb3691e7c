//! Shared test utilities for pipeline integration tests.
//!
//! Provides reusable fakes for the secret store and telemetry sink, plus
//! builders for configs and user identities, to reduce duplication across
//! test files.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use wisdom::config::PipelineConfig;
use wisdom::resolver::{
    PlanMembership, SecretStore, SecretStoreError, SecretSuffix, TenantId, UserIdentity,
};
use wisdom::retry::TelemetrySink;
use wisdom::secret::Secret;
use wisdom::PipelineVariant;

/// In-memory secret store keyed by `(tenant, suffix)`.
#[derive(Default)]
pub struct InMemorySecretStore {
    entries: HashMap<(u64, &'static str), String>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tenant: u64, suffix: SecretSuffix, value: &str) -> Self {
        self.entries.insert((tenant, suffix.as_str()), value.to_string());
        self
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(
        &self,
        tenant: TenantId,
        suffix: SecretSuffix,
    ) -> Result<Option<Secret>, SecretStoreError> {
        Ok(self
            .entries
            .get(&(tenant.0, suffix.as_str()))
            .map(|v| Secret::new(v.clone())))
    }

    async fn exists(
        &self,
        tenant: TenantId,
        suffix: SecretSuffix,
    ) -> Result<bool, SecretStoreError> {
        Ok(self.entries.contains_key(&(tenant.0, suffix.as_str())))
    }
}

/// Telemetry sink that counts retry increments and duration samples.
#[derive(Default)]
pub struct RecordingSink {
    pub retries: AtomicU32,
    pub samples: AtomicU32,
}

impl TelemetrySink for RecordingSink {
    fn increment_retry(&self, _operation: &'static str) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn observe_call_duration(&self, _operation: &'static str, _seconds: f64) {
        self.samples.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingSink {
    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }
}

/// A user that belongs to tenant 123.
pub fn tenant_user() -> UserIdentity {
    let mut user = UserIdentity::new(Uuid::new_v4());
    user.tenant_id = Some(TenantId(123));
    user
}

/// A tenant-less user on an active 90-day trial.
pub fn trial_user() -> UserIdentity {
    let mut user = UserIdentity::new(Uuid::new_v4());
    user.tenant_id = Some(TenantId(123));
    user.plans.push(PlanMembership {
        name: "trial of 90 days".to_string(),
        started_at: Utc::now() - Duration::days(1),
        expires_at: Some(Utc::now() + Duration::days(89)),
    });
    user
}

/// SaaS config pointing inference and IDP at the same mock server.
pub fn saas_config(base_url: &str, retry_count: u32) -> PipelineConfig {
    PipelineConfig {
        variant: PipelineVariant::Saas,
        inference_url: base_url.to_string(),
        idp_url: Some(base_url.to_string()),
        retry_count,
        ..Default::default()
    }
}

/// On-prem config with the literal credentials from the header contract.
pub fn onprem_config(base_url: &str) -> PipelineConfig {
    PipelineConfig {
        variant: PipelineVariant::OnPrem,
        inference_url: base_url.to_string(),
        username: Some("alice".to_string()),
        api_key: Some(Secret::new("K1")),
        model_id: Some("M1".to_string()),
        retry_count: 0,
        ..Default::default()
    }
}

/// Store holding the canonical `(K1, M1)` credentials for tenant 123.
pub fn tenant_store() -> Arc<InMemorySecretStore> {
    Arc::new(
        InMemorySecretStore::new()
            .with(123, SecretSuffix::ApiKey, "K1")
            .with(123, SecretSuffix::ModelId, "M1"),
    )
}
