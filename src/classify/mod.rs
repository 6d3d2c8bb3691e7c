//! Ordered-rule response classification.
//!
//! WCA does not expose a machine-readable error enum, so the only way to
//! tell "the tenant's model id is wrong" from "the API key is bad" from
//! "the platform is down" is to inspect the status code, the content type,
//! and the literal phrases in the body. The rules run as an ordered list
//! and the first match wins; several rules share a status code and are
//! distinguished by body shape alone, so the order is load-bearing.
//!
//! Classification is a pure function: no logging, no side effects. The
//! caller owns attaching the model id and emitting the one ERROR record.

use serde_json::Value;

/// Which rule list applies to a response.
///
/// The codematch endpoint never runs the HAP content filter and has no 422
/// validation path, so those two rules are absent from its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSet {
    /// Completion, playbook generation, playbook explanation.
    Model,
    /// Content match.
    CodeMatch,
}

/// Failure category for a model-endpoint response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    /// 204 - upstream had nothing to say.
    EmptyResponse,
    /// The model id was rejected for this API key.
    InvalidModelId,
    /// The hate/abuse/profanity filter blocked the input.
    HapFilterRejection,
    /// 400 not otherwise classified.
    BadRequest,
    /// Blocked at the Cloudflare edge.
    CloudflareRejection,
    /// Trial capacity exhausted.
    UserTrialExpired,
    /// The tenant's WCA instance no longer exists.
    InstanceDeleted,
    /// Model-side validation of the input failed (422).
    ValidationFailure,
    /// Any other upstream 4xx/5xx.
    InferenceFailure,
}

/// Outcome of classifying one HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Fail(FailKind),
}

/// Failure category for an IAM token-exchange response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFailKind {
    /// IAM explicitly rejected the API key.
    ApiKeyRejected,
    /// Everything else: unreachable, 5xx, malformed.
    Other,
}

/// Classify a model-endpoint response.
pub fn classify(rules: RuleSet, status: u16, content_type: Option<&str>, body: &str) -> Verdict {
    if status == 204 {
        return Verdict::Fail(FailKind::EmptyResponse);
    }

    let json: Option<Value> = serde_json::from_str(body).ok();

    if status == 400 {
        if let Some(error) = json_field_lower(json.as_ref(), "error") {
            if error.contains("bad request") && error.contains("'body', 'model_id'") {
                return Verdict::Fail(FailKind::InvalidModelId);
            }
        }
        if let Some(detail) = json_field_lower(json.as_ref(), "detail") {
            if detail.contains("failed to parse space id and model id") {
                return Verdict::Fail(FailKind::InvalidModelId);
            }
            if rules == RuleSet::Model
                && detail.contains("our filters detected a potential problem with entities in your input")
            {
                return Verdict::Fail(FailKind::HapFilterRejection);
            }
        }
        return Verdict::Fail(FailKind::BadRequest);
    }

    if status == 403 {
        if body.to_lowercase().contains("cloudflare") {
            return Verdict::Fail(FailKind::CloudflareRejection);
        }
        if let Some(message_id) = json_field_lower(json.as_ref(), "message_id") {
            if message_id.contains("wca-0001-e") {
                return Verdict::Fail(FailKind::UserTrialExpired);
            }
        }
        // Any other 403: the model is not entitled for this API key.
        return Verdict::Fail(FailKind::InvalidModelId);
    }

    if status == 404 {
        let json_content_type = content_type.is_some_and(|ct| ct.to_lowercase().contains("json"));
        if let Some(detail) = json_field_lower(json.as_ref(), "detail") {
            if json_content_type && detail.contains("wml api call failed") {
                return Verdict::Fail(FailKind::InvalidModelId);
            }
            if detail.contains("the wca instance") && detail.contains("has been deleted") {
                return Verdict::Fail(FailKind::InstanceDeleted);
            }
        }
        return Verdict::Fail(FailKind::InferenceFailure);
    }

    if status == 422 && rules == RuleSet::Model {
        if let Some(detail) = json_field_lower(json.as_ref(), "detail") {
            if detail.contains("validation failed") {
                return Verdict::Fail(FailKind::ValidationFailure);
            }
        }
    }

    if status < 400 {
        Verdict::Success
    } else {
        Verdict::Fail(FailKind::InferenceFailure)
    }
}

/// Classify an IAM token-exchange response. `None` means success.
pub fn classify_token_response(status: u16, body: &str) -> Option<TokenFailKind> {
    if (200..300).contains(&status) {
        return None;
    }

    if status == 400 {
        let json: Option<Value> = serde_json::from_str(body).ok();
        if let Some(message) = json_field_lower(json.as_ref(), "errorMessage") {
            if message.contains("property missing or empty")
                || message.contains("provided api key could not be found")
            {
                return Some(TokenFailKind::ApiKeyRejected);
            }
        }
    }

    Some(TokenFailKind::Other)
}

/// Extract a body field as lowercase text. Non-string values (the upstream
/// sometimes sends `detail` as a list) are rendered as JSON first.
fn json_field_lower(json: Option<&Value>, field: &str) -> Option<String> {
    let value = json?.get(field)?;
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(text.to_lowercase())
}
