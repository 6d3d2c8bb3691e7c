//! The pipeline failure taxonomy.
//!
//! Every kind maps to a distinct operational situation, and the surface is
//! deliberately wide: the admin console, the IDE plugin, and the health
//! probe all route on it. Kinds that arise from an HTTP exchange carry the
//! model id the request was attempted with. Display strings never contain
//! credential material.

use thiserror::Error;

use crate::classify::FailKind;
use crate::resolver::ResolveError;
use crate::retry::CallError;
use crate::token::TokenError;

/// Errors surfaced by pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No API key resolvable for the tenant. Administrator-actionable.
    #[error("no API key found for the requesting organization")]
    KeyNotFound,

    /// No model id resolvable for the tenant. Administrator-actionable.
    #[error("no model id found for the requesting organization")]
    ModelIdNotFound,

    /// User has no tenant and no override applies. User-actionable.
    #[error("no default model id available for this user")]
    NoDefaultModelId,

    /// Secret store unavailable; propagated as-is.
    #[error("secret store unavailable: {0}")]
    SecretStore(String),

    /// Upstream rejected the model id for this API key.
    #[error("the inference service rejected the configured model id")]
    InvalidModelId { model_id: Option<String> },

    /// IDP unreachable or erroring. Transient.
    #[error("token exchange with the identity provider failed")]
    TokenFailure { model_id: Option<String> },

    /// IDP explicitly rejected the API key. Administrator-actionable.
    #[error("the identity provider rejected the configured API key")]
    TokenApiKeyError { model_id: Option<String> },

    /// Upstream 4xx/5xx not otherwise classified. Transient.
    #[error("inference request failed")]
    InferenceFailure { model_id: Option<String> },

    /// Model-side validation of the input failed (422). User-actionable.
    #[error("the inference service could not validate the input")]
    ValidationFailure { model_id: Option<String> },

    /// Upstream 400 not otherwise classified. User-actionable.
    #[error("the inference service rejected the request")]
    BadRequest {
        model_id: Option<String>,
        /// The response body, preserved for the caller.
        detail: Option<serde_json::Value>,
    },

    /// The content filter blocked the input. User-actionable.
    #[error("the input was rejected by the content filter")]
    HapFilterRejection { model_id: Option<String> },

    /// Blocked at the Cloudflare edge. Transient.
    #[error("the request was blocked at the edge")]
    CloudflareRejection { model_id: Option<String> },

    /// Trial capacity exhausted. User-actionable.
    #[error("the user's trial has expired")]
    UserTrialExpired { model_id: Option<String> },

    /// The tenant's WCA instance no longer exists.
    #[error("the organization's WCA instance has been deleted")]
    InstanceDeleted { model_id: Option<String> },

    /// Upstream returned 204. Benign no-content.
    #[error("the inference service returned no content")]
    EmptyResponse { model_id: Option<String> },

    /// Per-call deadline exceeded on the final attempt.
    #[error("the model request timed out")]
    ModelTimeout { model_id: Option<String> },

    /// Request/response correlation id mismatch. Integrity error.
    #[error("request id mismatch between request and response")]
    CorrelationFailure { model_id: Option<String> },

    /// The caller cancelled the request; distinct from a timeout.
    #[error("the request was cancelled")]
    Cancelled,

    /// Operation not offered by this pipeline variant.
    #[error("operation '{0}' is not supported by this pipeline variant")]
    Unsupported(&'static str),

    /// Network-level failure that survived all retries.
    #[error("network error: {0}")]
    Network(String),
}

impl PipelineError {
    /// The model id the failed request was attempted with, when known.
    pub fn model_id(&self) -> Option<&str> {
        match self {
            Self::InvalidModelId { model_id }
            | Self::TokenFailure { model_id }
            | Self::TokenApiKeyError { model_id }
            | Self::InferenceFailure { model_id }
            | Self::ValidationFailure { model_id }
            | Self::BadRequest { model_id, .. }
            | Self::HapFilterRejection { model_id }
            | Self::CloudflareRejection { model_id }
            | Self::UserTrialExpired { model_id }
            | Self::InstanceDeleted { model_id }
            | Self::EmptyResponse { model_id }
            | Self::ModelTimeout { model_id }
            | Self::CorrelationFailure { model_id } => model_id.as_deref(),
            _ => None,
        }
    }

    /// Lift a classification verdict into the taxonomy.
    pub(crate) fn from_classification(
        kind: FailKind,
        model_id: &str,
        payload: Option<serde_json::Value>,
    ) -> Self {
        let model_id = Some(model_id.to_string());
        match kind {
            FailKind::EmptyResponse => Self::EmptyResponse { model_id },
            FailKind::InvalidModelId => Self::InvalidModelId { model_id },
            FailKind::HapFilterRejection => Self::HapFilterRejection { model_id },
            FailKind::BadRequest => Self::BadRequest {
                model_id,
                detail: payload,
            },
            FailKind::CloudflareRejection => Self::CloudflareRejection { model_id },
            FailKind::UserTrialExpired => Self::UserTrialExpired { model_id },
            FailKind::InstanceDeleted => Self::InstanceDeleted { model_id },
            FailKind::ValidationFailure => Self::ValidationFailure { model_id },
            FailKind::InferenceFailure => Self::InferenceFailure { model_id },
        }
    }

    /// Lift a no-response executor outcome into the taxonomy.
    pub(crate) fn from_call(err: CallError, model_id: &str) -> Self {
        match err {
            CallError::Timeout => Self::ModelTimeout {
                model_id: Some(model_id.to_string()),
            },
            CallError::Cancelled => Self::Cancelled,
            CallError::Network(msg) => Self::Network(msg),
        }
    }

    /// Lift a token-exchange failure, attaching the resolved model id.
    pub(crate) fn from_token(err: TokenError, model_id: &str) -> Self {
        match err {
            TokenError::ApiKeyRejected => Self::TokenApiKeyError {
                model_id: Some(model_id.to_string()),
            },
            TokenError::Exchange(_) => Self::TokenFailure {
                model_id: Some(model_id.to_string()),
            },
            TokenError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<ResolveError> for PipelineError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::KeyNotFound => Self::KeyNotFound,
            ResolveError::ModelIdNotFound => Self::ModelIdNotFound,
            ResolveError::NoDefaultModelId => Self::NoDefaultModelId,
            ResolveError::SecretStore(e) => Self::SecretStore(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_attached_on_http_kinds() {
        let err = PipelineError::from_classification(FailKind::InvalidModelId, "M1", None);
        assert_eq!(err.model_id(), Some("M1"));

        let err = PipelineError::from_call(CallError::Timeout, "M1");
        assert_eq!(err.model_id(), Some("M1"));
        assert!(matches!(err, PipelineError::ModelTimeout { .. }));
    }

    #[test]
    fn test_resolution_kinds_have_no_model_id() {
        assert_eq!(PipelineError::KeyNotFound.model_id(), None);
        assert_eq!(PipelineError::NoDefaultModelId.model_id(), None);
    }

    #[test]
    fn test_bad_request_preserves_payload() {
        let payload = serde_json::json!({"detail": "unexpected field"});
        let err =
            PipelineError::from_classification(FailKind::BadRequest, "M1", Some(payload.clone()));
        match err {
            PipelineError::BadRequest { detail, .. } => assert_eq!(detail, Some(payload)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cancellation_is_not_a_timeout() {
        let err = PipelineError::from_call(CallError::Cancelled, "M1");
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[test]
    fn test_token_errors_carry_model_id() {
        let err = PipelineError::from_token(TokenError::ApiKeyRejected, "M1");
        assert!(matches!(err, PipelineError::TokenApiKeyError { .. }));
        assert_eq!(err.model_id(), Some("M1"));
    }

    #[test]
    fn test_resolve_error_conversion() {
        let err: PipelineError = ResolveError::KeyNotFound.into();
        assert!(matches!(err, PipelineError::KeyNotFound));
    }
}
