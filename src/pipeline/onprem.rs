//! On-prem pipeline variant (Cloud Pak for Data).
//!
//! No IAM: every request carries `Authorization: ZenApiKey
//! base64(username:api_key)` built from the per-process configuration.
//! Trials do not apply and the secret store is never consulted; the
//! configured key and model id are the only defaults, with the envelope's
//! model override still honored.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::RuleSet;
use crate::config::{ConfigError, PipelineConfig};
use crate::health;
use crate::resolver::{CredentialResolver, DisabledSecretStore};
use crate::secret::Secret;

use super::error::PipelineError;
use super::factory::PipelineDeps;
use super::headers;
use super::types::{
    CompletionRequest, CompletionResponse, ContentMatchRequest, ContentMatchResponse,
    PlaybookExplanationRequest, PlaybookGenerationRequest, PlaybookGenerationResponse,
    RequestEnvelope,
};
use super::wca::{self, WcaCall, WcaHttp};
use super::{Anonymizer, ModelPipeline, PipelineCapabilities, PipelineVariant, PlaybookLinter};

pub struct OnPremPipeline {
    wca: WcaHttp,
    resolver: CredentialResolver,
    username: String,
    anonymizer: Option<Arc<dyn Anonymizer>>,
    linter: Option<Arc<dyn PlaybookLinter>>,
    task_timeout: Duration,
    health_api_key: Option<Secret>,
    health_model_id: Option<String>,
}

impl OnPremPipeline {
    pub fn new(
        config: &PipelineConfig,
        client: reqwest::Client,
        deps: PipelineDeps,
    ) -> Result<Self, ConfigError> {
        let username = config
            .username
            .clone()
            .ok_or_else(|| ConfigError::MissingField("username".to_string()))?;
        if config.api_key.is_none() {
            return Err(ConfigError::MissingField("api_key".to_string()));
        }

        // Configured overrides are the only credential source on-prem.
        let resolver = CredentialResolver::new(
            Arc::new(DisabledSecretStore),
            config.api_key.clone(),
            config.model_id.clone(),
            None,
        );

        Ok(Self {
            wca: WcaHttp::new(
                client,
                config.inference_url.clone(),
                config.retry_policy(),
                deps.telemetry,
            ),
            resolver,
            username,
            anonymizer: deps.anonymizer,
            linter: deps.linter,
            task_timeout: config.task_timeout(),
            health_api_key: config.health_api_key.clone().or_else(|| config.api_key.clone()),
            health_model_id: config.health_model_id.clone().or_else(|| config.model_id.clone()),
        })
    }

    async fn credentials<T>(
        &self,
        envelope: &RequestEnvelope<T>,
    ) -> Result<(String, String), PipelineError> {
        let api_key = self
            .resolver
            .resolve_api_key(&envelope.user, envelope.tenant_id)
            .await?;
        let model_id = self
            .resolver
            .resolve_model_id(
                &envelope.user,
                envelope.tenant_id,
                envelope.model_id_override.as_deref(),
            )
            .await?;
        Ok((headers::zen_api_key(&self.username, &api_key), model_id))
    }

    fn anonymizer_for<T>(&self, envelope: &RequestEnvelope<T>) -> Option<&dyn Anonymizer> {
        if envelope.anonymize_enabled() {
            self.anonymizer.as_deref()
        } else {
            None
        }
    }
}

#[async_trait]
impl ModelPipeline for OnPremPipeline {
    fn variant(&self) -> PipelineVariant {
        PipelineVariant::OnPrem
    }

    fn capabilities(&self) -> PipelineCapabilities {
        PipelineCapabilities::ALL
    }

    async fn complete(
        &self,
        envelope: &RequestEnvelope<CompletionRequest>,
    ) -> Result<CompletionResponse, PipelineError> {
        let (authorization, model_id) = self.credentials(envelope).await?;

        let timeout = wca::completion_timeout(self.task_timeout, &envelope.input.prompt);
        let body = wca::completion_body(&model_id, &envelope.input.context, &envelope.input.prompt);

        let value = self
            .wca
            .execute(
                WcaCall {
                    operation: "completions",
                    path: wca::COMPLETIONS_PATH,
                    authorization: Some(authorization),
                    correlation_id: envelope.correlation_id.as_deref(),
                    user_uuid: None,
                    model_id: &model_id,
                    timeout,
                    body,
                    rules: RuleSet::Model,
                },
                &envelope.cancellation,
                envelope.deadline,
            )
            .await?;

        wca::parse_completions(value, model_id)
    }

    async fn content_match(
        &self,
        envelope: &RequestEnvelope<ContentMatchRequest>,
    ) -> Result<ContentMatchResponse, PipelineError> {
        let (authorization, model_id) = self.credentials(envelope).await?;

        let suggestions = envelope.input.suggestions.len() as u32;
        let body = serde_json::json!({
            "model_id": model_id,
            "input": envelope.input.suggestions,
        });

        let value = self
            .wca
            .execute(
                WcaCall {
                    operation: "content_match",
                    path: wca::CODEMATCH_PATH,
                    authorization: Some(authorization),
                    correlation_id: None,
                    user_uuid: None,
                    model_id: &model_id,
                    timeout: self.task_timeout * suggestions.max(1),
                    body,
                    rules: RuleSet::CodeMatch,
                },
                &envelope.cancellation,
                envelope.deadline,
            )
            .await?;

        Ok(ContentMatchResponse {
            model_id,
            body: value,
        })
    }

    async fn generate_playbook(
        &self,
        envelope: &RequestEnvelope<PlaybookGenerationRequest>,
    ) -> Result<PlaybookGenerationResponse, PipelineError> {
        let (authorization, model_id) = self.credentials(envelope).await?;

        let body = wca::generation_body(&model_id, &envelope.input, self.anonymizer_for(envelope));

        let value = self
            .wca
            .execute(
                WcaCall {
                    operation: "playbook_generation",
                    path: wca::PLAYBOOK_GEN_PATH,
                    authorization: Some(authorization),
                    correlation_id: envelope.correlation_id.as_deref(),
                    user_uuid: None,
                    model_id: &model_id,
                    timeout: self.task_timeout,
                    body,
                    rules: RuleSet::Model,
                },
                &envelope.cancellation,
                envelope.deadline,
            )
            .await?;

        let mut generated = wca::parse_generation(value, &model_id)?;
        generated.playbook = wca::apply_lint(self.linter.as_ref(), generated.playbook).await;
        Ok(generated)
    }

    async fn explain_playbook(
        &self,
        envelope: &RequestEnvelope<PlaybookExplanationRequest>,
    ) -> Result<String, PipelineError> {
        let (authorization, model_id) = self.credentials(envelope).await?;

        let body = wca::explanation_body(&model_id, &envelope.input, self.anonymizer_for(envelope));

        let value = self
            .wca
            .execute(
                WcaCall {
                    operation: "playbook_explanation",
                    path: wca::PLAYBOOK_EXPLAIN_PATH,
                    authorization: Some(authorization),
                    correlation_id: envelope.correlation_id.as_deref(),
                    user_uuid: None,
                    model_id: &model_id,
                    timeout: self.task_timeout,
                    body,
                    rules: RuleSet::Model,
                },
                &envelope.cancellation,
                envelope.deadline,
            )
            .await?;

        wca::parse_explanation(value, &model_id)
    }

    async fn self_test(&self) -> Result<(), PipelineError> {
        let api_key = self.health_api_key.clone().ok_or(PipelineError::KeyNotFound)?;
        let model_id = self
            .health_model_id
            .clone()
            .ok_or(PipelineError::ModelIdNotFound)?;

        let correlation_id = Uuid::new_v4().to_string();
        let body = wca::completion_body(&model_id, health::PROBE_CONTEXT, health::PROBE_PROMPT);

        self.wca
            .execute(
                WcaCall {
                    operation: "health",
                    path: wca::COMPLETIONS_PATH,
                    authorization: Some(headers::zen_api_key(&self.username, &api_key)),
                    correlation_id: Some(&correlation_id),
                    user_uuid: None,
                    model_id: &model_id,
                    timeout: self.task_timeout,
                    body,
                    rules: RuleSet::Model,
                },
                &CancellationToken::new(),
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::UserIdentity;
    use crate::retry::NoopSink;

    fn onprem_config(inference_url: String) -> PipelineConfig {
        PipelineConfig {
            variant: PipelineVariant::OnPrem,
            inference_url,
            username: Some("alice".to_string()),
            api_key: Some(Secret::new("K1")),
            model_id: Some("M1".to_string()),
            retry_count: 0,
            ..Default::default()
        }
    }

    fn pipeline(server: &mockito::ServerGuard) -> OnPremPipeline {
        let config = onprem_config(server.url());
        let deps = PipelineDeps::new(Arc::new(DisabledSecretStore), Arc::new(NoopSink));
        OnPremPipeline::new(&config, reqwest::Client::new(), deps).unwrap()
    }

    fn envelope<T>(input: T) -> RequestEnvelope<T> {
        RequestEnvelope::new(UserIdentity::new(Uuid::new_v4()), input)
    }

    #[tokio::test]
    async fn test_complete_sends_zen_api_key_header() {
        let mut server = mockito::Server::new_async().await;
        // base64("alice:K1") == "YWxpY2U6SzE="
        let mock = server
            .mock("POST", "/v1/wca/codegen/ansible")
            .match_header("authorization", "ZenApiKey YWxpY2U6SzE=")
            .with_status(200)
            .with_body(r#"{"predictions":["  ansible.builtin.apt:"]}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server);
        let response = pipeline
            .complete(&envelope(CompletionRequest {
                context: String::new(),
                prompt: "- name: install apache".to_string(),
            }))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.model_id, "M1");
    }

    #[tokio::test]
    async fn test_no_token_exchange_happens() {
        let mut server = mockito::Server::new_async().await;
        // A /token call would hit this mock and fail the expect(0).
        let token = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;
        server
            .mock("POST", "/v1/wca/codegen/ansible")
            .with_status(200)
            .with_body(r#"{"predictions":[]}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server);
        pipeline
            .complete(&envelope(CompletionRequest::default()))
            .await
            .unwrap();

        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_construction_requires_username_and_key() {
        let mut config = onprem_config("https://cpd".to_string());
        config.username = None;
        let deps = PipelineDeps::new(Arc::new(DisabledSecretStore), Arc::new(NoopSink));
        assert!(OnPremPipeline::new(&config, reqwest::Client::new(), deps).is_err());

        let mut config = onprem_config("https://cpd".to_string());
        config.api_key = None;
        let deps = PipelineDeps::new(Arc::new(DisabledSecretStore), Arc::new(NoopSink));
        assert!(OnPremPipeline::new(&config, reqwest::Client::new(), deps).is_err());
    }

    #[tokio::test]
    async fn test_model_override_wins_over_configured_default() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/wca/codegen/ansible")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model_id": "experimental"
            })))
            .with_status(200)
            .with_body(r#"{"predictions":[]}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server);
        let envelope = envelope(CompletionRequest::default()).with_model_id("experimental");
        let response = pipeline.complete(&envelope).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.model_id, "experimental");
    }

    #[tokio::test]
    async fn test_explain_playbook_on_prem() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/wca/explain/ansible/playbook")
            .match_header("authorization", "ZenApiKey YWxpY2U6SzE=")
            .with_status(200)
            .with_body(r#"{"explanation":"Installs things."}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server);
        let explanation = pipeline
            .explain_playbook(&envelope(PlaybookExplanationRequest {
                content: "---".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_eq!(explanation, "Installs things.");
    }

    #[tokio::test]
    async fn test_self_test_uses_health_credentials() {
        let mut server = mockito::Server::new_async().await;
        // base64("alice:HK") == "YWxpY2U6SEs="
        let mock = server
            .mock("POST", "/v1/wca/codegen/ansible")
            .match_header("authorization", "ZenApiKey YWxpY2U6SEs=")
            .with_status(200)
            .with_body(r#"{"predictions":[]}"#)
            .create_async()
            .await;

        let mut config = onprem_config(server.url());
        config.health_api_key = Some(Secret::new("HK"));
        config.health_model_id = Some("HM".to_string());
        let deps = PipelineDeps::new(Arc::new(DisabledSecretStore), Arc::new(NoopSink));
        let pipeline = OnPremPipeline::new(&config, reqwest::Client::new(), deps).unwrap();

        pipeline.self_test().await.unwrap();
        mock.assert_async().await;
    }
}
