//! Plain HTTP pipeline variant.
//!
//! Talks to a model server that speaks the WCA completion protocol without
//! the WCA credentialing stack: no token exchange, no secret store, and a
//! `Bearer` header only when an API key is configured. Offers completions
//! and the self test; everything else reports `Unsupported`.

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
use super::types::{CompletionRequest, CompletionResponse, RequestEnvelope};
use super::wca::{self, WcaCall, WcaHttp};
use super::{ModelPipeline, PipelineCapabilities, PipelineVariant};

pub struct HttpPipeline {
    wca: WcaHttp,
    resolver: CredentialResolver,
    api_key: Option<Secret>,
    task_timeout: Duration,
    health_model_id: Option<String>,
}

impl HttpPipeline {
    pub fn new(
        config: &PipelineConfig,
        client: reqwest::Client,
        deps: PipelineDeps,
    ) -> Result<Self, ConfigError> {
        let resolver = CredentialResolver::new(
            Arc::new(DisabledSecretStore),
            // The HTTP variant authenticates (or not) with the configured
            // key; resolution only needs to produce a model id.
            Some(config.api_key.clone().unwrap_or_else(|| Secret::new(""))),
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
            api_key: config.api_key.clone(),
            task_timeout: config.task_timeout(),
            health_model_id: config.health_model_id.clone().or_else(|| config.model_id.clone()),
        })
    }

    fn authorization(&self) -> Option<String> {
        self.api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| format!("Bearer {}", key.expose()))
    }
}

#[async_trait]
impl ModelPipeline for HttpPipeline {
    fn variant(&self) -> PipelineVariant {
        PipelineVariant::Http
    }

    fn capabilities(&self) -> PipelineCapabilities {
        PipelineCapabilities::COMPLETIONS_ONLY
    }

    async fn complete(
        &self,
        envelope: &RequestEnvelope<CompletionRequest>,
    ) -> Result<CompletionResponse, PipelineError> {
        let model_id = self
            .resolver
            .resolve_model_id(
                &envelope.user,
                envelope.tenant_id,
                envelope.model_id_override.as_deref(),
            )
            .await?;

        let timeout = wca::completion_timeout(self.task_timeout, &envelope.input.prompt);
        let body = wca::completion_body(&model_id, &envelope.input.context, &envelope.input.prompt);

        let value = self
            .wca
            .execute(
                WcaCall {
                    operation: "completions",
                    path: wca::COMPLETIONS_PATH,
                    authorization: self.authorization(),
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

    async fn self_test(&self) -> Result<(), PipelineError> {
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
                    authorization: self.authorization(),
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

    fn http_config(inference_url: String) -> PipelineConfig {
        PipelineConfig {
            variant: PipelineVariant::Http,
            inference_url,
            model_id: Some("local-model".to_string()),
            retry_count: 0,
            ..Default::default()
        }
    }

    fn pipeline(config: PipelineConfig) -> HttpPipeline {
        let deps = PipelineDeps::new(Arc::new(DisabledSecretStore), Arc::new(NoopSink));
        HttpPipeline::new(&config, reqwest::Client::new(), deps).unwrap()
    }

    fn envelope<T>(input: T) -> RequestEnvelope<T> {
        RequestEnvelope::new(UserIdentity::new(Uuid::new_v4()), input)
    }

    #[tokio::test]
    async fn test_complete_without_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/wca/codegen/ansible")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"predictions":["  ansible.builtin.apt:"]}"#)
            .create_async()
            .await;

        let pipeline = pipeline(http_config(server.url()));
        let response = pipeline
            .complete(&envelope(CompletionRequest {
                context: String::new(),
                prompt: "- name: install apache".to_string(),
            }))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.model_id, "local-model");
    }

    #[tokio::test]
    async fn test_complete_with_configured_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/wca/codegen/ansible")
            .match_header("authorization", "Bearer K1")
            .with_status(200)
            .with_body(r#"{"predictions":[]}"#)
            .create_async()
            .await;

        let mut config = http_config(server.url());
        config.api_key = Some(Secret::new("K1"));
        let pipeline = pipeline(config);
        pipeline
            .complete(&envelope(CompletionRequest::default()))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_other_operations_are_unsupported() {
        let pipeline = pipeline(http_config("http://localhost:9000".to_string()));
        assert!(!pipeline.capabilities().content_match);

        let result = pipeline
            .content_match(&envelope(crate::pipeline::ContentMatchRequest::default()))
            .await;
        assert!(matches!(result, Err(PipelineError::Unsupported("content_match"))));

        let result = pipeline
            .generate_playbook(&envelope(crate::pipeline::PlaybookGenerationRequest::default()))
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Unsupported("playbook_generation"))
        ));
    }

    #[tokio::test]
    async fn test_self_test_without_model_id_fails() {
        let mut config = http_config("http://localhost:9000".to_string());
        config.model_id = None;
        let pipeline = pipeline(config);

        let result = pipeline.self_test().await;
        assert!(matches!(result, Err(PipelineError::ModelIdNotFound)));
    }
}
