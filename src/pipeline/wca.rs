//! Shared HTTP plumbing for the WCA-speaking variants.
//!
//! One request = build the POST, run it through the backoff executor,
//! verify the echoed correlation id, classify the result, and either parse
//! the success body or emit exactly one structured ERROR record and map the
//! failure kind. The higher layers never log the same failure again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::{classify, RuleSet, Verdict};
use crate::retry::{self, RetryPolicy, TelemetrySink};

use super::error::PipelineError;
use super::headers;
use super::types::{CompletionResponse, PlaybookGenerationResponse};

pub(crate) const COMPLETIONS_PATH: &str = "/v1/wca/codegen/ansible";
pub(crate) const CODEMATCH_PATH: &str = "/v1/wca/codematch/ansible";
pub(crate) const PLAYBOOK_GEN_PATH: &str = "/v1/wca/codegen/ansible/playbook";
pub(crate) const PLAYBOOK_EXPLAIN_PATH: &str = "/v1/wca/explain/ansible/playbook";

/// One upstream call, fully described. All values are locals of the
/// operation method; nothing is carried on the pipeline between calls.
pub(crate) struct WcaCall<'a> {
    pub operation: &'static str,
    pub path: &'static str,
    /// Pre-built `Authorization` value, if the variant sends one.
    pub authorization: Option<String>,
    pub correlation_id: Option<&'a str>,
    pub user_uuid: Option<Uuid>,
    pub model_id: &'a str,
    pub timeout: Duration,
    pub body: serde_json::Value,
    pub rules: RuleSet,
}

/// Connection pool plus the retry/telemetry plumbing shared by the
/// SaaS, on-prem, and HTTP variants.
pub(crate) struct WcaHttp {
    client: reqwest::Client,
    inference_url: String,
    policy: RetryPolicy,
    sink: Arc<dyn TelemetrySink>,
}

impl WcaHttp {
    pub fn new(
        client: reqwest::Client,
        inference_url: String,
        policy: RetryPolicy,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            client,
            inference_url,
            policy,
            sink,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.inference_url.trim_end_matches('/'), path)
    }

    /// Execute one call and return the parsed success body.
    pub async fn execute(
        &self,
        call: WcaCall<'_>,
        cancellation: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<serde_json::Value, PipelineError> {
        let url = self.endpoint(call.path);

        let response = retry::execute(
            &self.policy,
            self.sink.as_ref(),
            call.operation,
            cancellation,
            deadline,
            || {
                let mut request = self
                    .client
                    .post(&url)
                    .timeout(call.timeout)
                    .json(&call.body);
                if let Some(auth) = &call.authorization {
                    request = request.header(reqwest::header::AUTHORIZATION, auth.as_str());
                }
                if let Some(id) = call.correlation_id {
                    request = request.header(headers::REQUEST_ID_HEADER, id);
                }
                if let Some(uuid) = call.user_uuid {
                    request = request.header(headers::REQUEST_USER_UUID_HEADER, uuid.to_string());
                }
                request.send()
            },
        )
        .await
        .map_err(|err| PipelineError::from_call(err, call.model_id))?;

        // Correlation check runs before body classification: a response
        // that answers someone else's request must never be interpreted.
        if let Some(expected) = call.correlation_id.filter(|id| !id.is_empty()) {
            let echoed = response
                .headers()
                .get(headers::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if !echoed.is_empty() && echoed != expected {
                tracing::error!(
                    operation = call.operation,
                    expected,
                    echoed,
                    "request id mismatch"
                );
                return Err(PipelineError::CorrelationFailure {
                    model_id: Some(call.model_id.to_string()),
                });
            }
        }

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|err| PipelineError::Network(err.to_string()))?;

        match classify(call.rules, status, content_type.as_deref(), &body) {
            Verdict::Success => serde_json::from_str(&body).map_err(|err| {
                tracing::error!(
                    operation = call.operation,
                    status,
                    content_type = content_type.as_deref().unwrap_or(""),
                    error = %err,
                    "success status with unparseable body"
                );
                PipelineError::InferenceFailure {
                    model_id: Some(call.model_id.to_string()),
                }
            }),
            Verdict::Fail(kind) => {
                tracing::error!(
                    operation = call.operation,
                    status,
                    content_type = content_type.as_deref().unwrap_or(""),
                    body = %body,
                    "inference request classified as {:?}",
                    kind
                );
                Err(PipelineError::from_classification(
                    kind,
                    call.model_id,
                    serde_json::from_str(&body).ok(),
                ))
            }
        }
    }
}

/// Per-request timeout: one task budget per `&`-separated task, so a
/// prompt asking for `n` tasks gets `n × timeout_per_task`.
pub(crate) fn completion_timeout(task_timeout: Duration, prompt: &str) -> Duration {
    task_timeout * (crate::prompt::task_count(prompt) as u32).max(1)
}

/// Build the completion body: `{model_id, prompt: context + normalized}`.
pub(crate) fn completion_body(model_id: &str, context: &str, prompt: &str) -> serde_json::Value {
    let normalized = crate::prompt::normalize_prompt(prompt);
    serde_json::json!({
        "model_id": model_id,
        "prompt": format!("{}{}", context, normalized),
    })
}

fn maybe_anonymize(anonymizer: Option<&dyn super::Anonymizer>, text: &str) -> String {
    match anonymizer {
        Some(anonymizer) => anonymizer.anonymize(text),
        None => text.to_string(),
    }
}

/// Build the playbook-generation body. Free-text fields pass through the
/// anonymizer when one applies; `custom_prompt` is forced to end with a
/// newline; an empty outline is omitted entirely.
pub(crate) fn generation_body(
    model_id: &str,
    input: &super::types::PlaybookGenerationRequest,
    anonymizer: Option<&dyn super::Anonymizer>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model_id": model_id,
        "text": maybe_anonymize(anonymizer, &input.text),
        "create_outline": input.create_outline,
    });
    if let Some(outline) = input.outline.as_deref().filter(|o| !o.is_empty()) {
        body["outline"] = serde_json::Value::String(maybe_anonymize(anonymizer, outline));
    }
    if let Some(custom_prompt) = input.custom_prompt.as_deref() {
        let mut custom_prompt = maybe_anonymize(anonymizer, custom_prompt);
        if !custom_prompt.ends_with('\n') {
            custom_prompt.push('\n');
        }
        body["custom_prompt"] = serde_json::Value::String(custom_prompt);
    }
    body
}

/// Build the playbook-explanation body: `{model_id, playbook, custom_prompt?}`.
pub(crate) fn explanation_body(
    model_id: &str,
    input: &super::types::PlaybookExplanationRequest,
    anonymizer: Option<&dyn super::Anonymizer>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model_id": model_id,
        "playbook": maybe_anonymize(anonymizer, &input.content),
    });
    if let Some(custom_prompt) = input.custom_prompt.as_deref() {
        body["custom_prompt"] = serde_json::Value::String(maybe_anonymize(anonymizer, custom_prompt));
    }
    body
}

/// Run the lint collaborator over a generated playbook. Lint failures are
/// logged and the unlinted playbook is returned; generation already
/// succeeded from the caller's point of view.
pub(crate) async fn apply_lint(
    linter: Option<&std::sync::Arc<dyn super::PlaybookLinter>>,
    playbook: String,
) -> String {
    match linter {
        Some(linter) => match linter.run(playbook.clone()).await {
            Ok(linted) => linted,
            Err(err) => {
                tracing::warn!(error = %err, "playbook lint failed, returning unlinted text");
                playbook
            }
        },
        None => playbook,
    }
}

#[derive(Deserialize)]
struct PredictionsBody {
    predictions: Vec<String>,
}

/// Extract predictions from a completion response body.
pub(crate) fn parse_completions(
    value: serde_json::Value,
    model_id: String,
) -> Result<CompletionResponse, PipelineError> {
    let body: PredictionsBody = serde_json::from_value(value).map_err(|err| {
        tracing::error!(error = %err, "completion body missing predictions");
        PipelineError::InferenceFailure {
            model_id: Some(model_id.clone()),
        }
    })?;
    Ok(CompletionResponse {
        predictions: body.predictions,
        model_id,
    })
}

#[derive(Deserialize)]
struct GenerationBody {
    playbook: String,
    #[serde(default)]
    outline: String,
    #[serde(default)]
    warnings: Vec<serde_json::Value>,
}

/// Extract playbook, outline, and warnings from a generation body.
pub(crate) fn parse_generation(
    value: serde_json::Value,
    model_id: &str,
) -> Result<PlaybookGenerationResponse, PipelineError> {
    let body: GenerationBody = serde_json::from_value(value).map_err(|err| {
        tracing::error!(error = %err, "generation body missing playbook");
        PipelineError::InferenceFailure {
            model_id: Some(model_id.to_string()),
        }
    })?;
    Ok(PlaybookGenerationResponse {
        playbook: body.playbook,
        outline: body.outline,
        warnings: body.warnings,
    })
}

#[derive(Deserialize)]
struct ExplanationBody {
    explanation: String,
}

/// Extract the explanation text from an explanation body.
pub(crate) fn parse_explanation(
    value: serde_json::Value,
    model_id: &str,
) -> Result<String, PipelineError> {
    let body: ExplanationBody = serde_json::from_value(value).map_err(|err| {
        tracing::error!(error = %err, "explanation body missing explanation");
        PipelineError::InferenceFailure {
            model_id: Some(model_id.to_string()),
        }
    })?;
    Ok(body.explanation)
}
