//! Request and response types shared by all pipeline variants.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::resolver::{TenantId, UserIdentity};

/// Everything a pipeline needs to execute one operation.
///
/// The envelope is built per request and never reused; the pipeline keeps
/// no per-request state of its own.
#[derive(Debug, Clone)]
pub struct RequestEnvelope<T> {
    /// Caller-generated request id, round-tripped as a header. The echoed
    /// header must match exactly; a mismatch is an integrity error.
    pub correlation_id: Option<String>,
    /// Organization to act on behalf of; falls back to the user's tenant.
    pub tenant_id: Option<TenantId>,
    /// Interactive model override. Wins over the org default.
    pub model_id_override: Option<String>,
    /// The requesting user.
    pub user: UserIdentity,
    /// Tenant anonymization flag; `None` (tenant unknown) defaults to on.
    pub anonymize: Option<bool>,
    /// Cancels in-flight attempts and pending retries.
    pub cancellation: CancellationToken,
    /// Overall deadline; expiry between attempts surfaces as a timeout.
    pub deadline: Option<Instant>,
    /// The operation input.
    pub input: T,
}

impl<T> RequestEnvelope<T> {
    /// New envelope with a fresh correlation id.
    pub fn new(user: UserIdentity, input: T) -> Self {
        Self {
            correlation_id: Some(Uuid::new_v4().to_string()),
            tenant_id: None,
            model_id_override: None,
            user,
            anonymize: None,
            cancellation: CancellationToken::new(),
            deadline: None,
            input,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant_id = Some(tenant);
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id_override = Some(model_id.into());
        self
    }

    /// Anonymization applies unless the tenant explicitly opted out.
    pub fn anonymize_enabled(&self) -> bool {
        self.anonymize.unwrap_or(true)
    }
}

/// Input for code completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Playbook text preceding the cursor; transmitted verbatim.
    pub context: String,
    /// The task prompt; normalized before transmission.
    pub prompt: String,
}

/// Completion result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub predictions: Vec<String>,
    pub model_id: String,
}

/// Input for content matching: suggestions in display order.
#[derive(Debug, Clone, Default)]
pub struct ContentMatchRequest {
    pub suggestions: Vec<String>,
}

/// Content-match result: the upstream body is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMatchResponse {
    pub model_id: String,
    pub body: serde_json::Value,
}

/// Input for playbook generation.
#[derive(Debug, Clone, Default)]
pub struct PlaybookGenerationRequest {
    /// What the playbook should do, in natural language.
    pub text: String,
    /// Extra instructions; forced to end with a newline on the wire.
    pub custom_prompt: Option<String>,
    /// Existing outline to generate from.
    pub outline: Option<String>,
    /// Ask the upstream for an outline alongside the playbook.
    pub create_outline: bool,
    /// Caller-side correlation for its own bookkeeping; not transmitted.
    pub generation_id: Option<String>,
}

/// Playbook generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookGenerationResponse {
    pub playbook: String,
    pub outline: String,
    pub warnings: Vec<serde_json::Value>,
}

/// Input for playbook explanation.
#[derive(Debug, Clone, Default)]
pub struct PlaybookExplanationRequest {
    /// The playbook to explain.
    pub content: String,
    /// Extra instructions for the explanation.
    pub custom_prompt: Option<String>,
    /// Caller-side correlation for its own bookkeeping; not transmitted.
    pub explanation_id: Option<String>,
}
