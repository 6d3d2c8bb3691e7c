//! SaaS pipeline variant.
//!
//! Talks to hosted WCA with per-request bearer tokens from IBM IAM:
//! resolve the tenant's credentials, exchange the API key for a token,
//! POST with `Authorization: Bearer`, `X-Request-ID`, and
//! `X-Request-User-UUID`, then classify. Offers all four operations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::RuleSet;
use crate::config::{ConfigError, PipelineConfig};
use crate::health;
use crate::resolver::CredentialResolver;
use crate::secret::Secret;
use crate::token::TokenClient;

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

pub struct SaasPipeline {
    wca: WcaHttp,
    resolver: CredentialResolver,
    tokens: TokenClient,
    anonymizer: Option<Arc<dyn Anonymizer>>,
    linter: Option<Arc<dyn PlaybookLinter>>,
    task_timeout: Duration,
    health_api_key: Option<Secret>,
    health_model_id: Option<String>,
}

impl SaasPipeline {
    pub fn new(
        config: &PipelineConfig,
        client: reqwest::Client,
        deps: PipelineDeps,
    ) -> Result<Self, ConfigError> {
        let idp_url = config
            .idp_url
            .clone()
            .ok_or_else(|| ConfigError::MissingField("idp_url".to_string()))?;
        let basic_auth = match (&config.idp_login, &config.idp_password) {
            (Some(login), Some(password)) => Some((login.clone(), password.clone())),
            _ => None,
        };

        let policy = config.retry_policy();
        let tokens = TokenClient::new(
            client.clone(),
            idp_url,
            basic_auth,
            policy.clone(),
            deps.telemetry.clone(),
        );
        let resolver = CredentialResolver::new(
            deps.secret_store,
            config.api_key.clone(),
            config.model_id.clone(),
            config.trial_defaults(),
        );

        Ok(Self {
            wca: WcaHttp::new(
                client,
                config.inference_url.clone(),
                policy,
                deps.telemetry,
            ),
            resolver,
            tokens,
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
    ) -> Result<(Secret, String), PipelineError> {
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
        Ok((api_key, model_id))
    }

    async fn authorization(
        &self,
        api_key: &Secret,
        model_id: &str,
        cancellation: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let token = self
            .tokens
            .bearer_token(api_key, cancellation)
            .await
            .map_err(|err| PipelineError::from_token(err, model_id))?;
        Ok(headers::bearer(&token))
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
impl ModelPipeline for SaasPipeline {
    fn variant(&self) -> PipelineVariant {
        PipelineVariant::Saas
    }

    fn capabilities(&self) -> PipelineCapabilities {
        PipelineCapabilities::ALL
    }

    async fn complete(
        &self,
        envelope: &RequestEnvelope<CompletionRequest>,
    ) -> Result<CompletionResponse, PipelineError> {
        let (api_key, model_id) = self.credentials(envelope).await?;
        let authorization = self
            .authorization(&api_key, &model_id, &envelope.cancellation)
            .await?;

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
                    user_uuid: Some(envelope.user.user_id),
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
        let (api_key, model_id) = self.credentials(envelope).await?;
        let authorization = self
            .authorization(&api_key, &model_id, &envelope.cancellation)
            .await?;

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
        let (api_key, model_id) = self.credentials(envelope).await?;
        let authorization = self
            .authorization(&api_key, &model_id, &envelope.cancellation)
            .await?;

        let body = wca::generation_body(&model_id, &envelope.input, self.anonymizer_for(envelope));

        let value = self
            .wca
            .execute(
                WcaCall {
                    operation: "playbook_generation",
                    path: wca::PLAYBOOK_GEN_PATH,
                    authorization: Some(authorization),
                    correlation_id: envelope.correlation_id.as_deref(),
                    user_uuid: Some(envelope.user.user_id),
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
        let (api_key, model_id) = self.credentials(envelope).await?;
        let authorization = self
            .authorization(&api_key, &model_id, &envelope.cancellation)
            .await?;

        let body = wca::explanation_body(&model_id, &envelope.input, self.anonymizer_for(envelope));

        let value = self
            .wca
            .execute(
                WcaCall {
                    operation: "playbook_explanation",
                    path: wca::PLAYBOOK_EXPLAIN_PATH,
                    authorization: Some(authorization),
                    correlation_id: envelope.correlation_id.as_deref(),
                    user_uuid: Some(envelope.user.user_id),
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

        let cancellation = CancellationToken::new();
        let authorization = self.authorization(&api_key, &model_id, &cancellation).await?;

        let correlation_id = Uuid::new_v4().to_string();
        let body = wca::completion_body(&model_id, health::PROBE_CONTEXT, health::PROBE_PROMPT);

        self.wca
            .execute(
                WcaCall {
                    operation: "health",
                    path: wca::COMPLETIONS_PATH,
                    authorization: Some(authorization),
                    correlation_id: Some(&correlation_id),
                    user_uuid: None,
                    model_id: &model_id,
                    timeout: self.task_timeout,
                    body,
                    rules: RuleSet::Model,
                },
                &cancellation,
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{SecretStore, SecretSuffix, TenantId, UserIdentity};
    use crate::resolver::SecretStoreError;
    use crate::retry::NoopSink;

    struct SingleTenantStore;

    #[async_trait]
    impl SecretStore for SingleTenantStore {
        async fn get(
            &self,
            tenant: TenantId,
            suffix: SecretSuffix,
        ) -> Result<Option<Secret>, SecretStoreError> {
            if tenant != TenantId(123) {
                return Ok(None);
            }
            Ok(match suffix {
                SecretSuffix::ApiKey => Some(Secret::new("K1")),
                SecretSuffix::ModelId => Some(Secret::new("M1")),
            })
        }
    }

    fn saas_config(inference_url: String, idp_url: String) -> PipelineConfig {
        PipelineConfig {
            variant: PipelineVariant::Saas,
            inference_url,
            idp_url: Some(idp_url),
            retry_count: 0,
            ..Default::default()
        }
    }

    fn pipeline(server: &mockito::ServerGuard) -> SaasPipeline {
        let config = saas_config(server.url(), server.url());
        let deps = PipelineDeps::new(Arc::new(SingleTenantStore), Arc::new(NoopSink));
        SaasPipeline::new(&config, reqwest::Client::new(), deps).unwrap()
    }

    fn tenant_envelope<T>(input: T) -> RequestEnvelope<T> {
        let mut user = UserIdentity::new(Uuid::new_v4());
        user.tenant_id = Some(TenantId(123));
        RequestEnvelope::new(user, input)
    }

    async fn token_mock(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"T1","expires_in":3600}"#)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_complete_exchanges_token_and_posts() {
        let mut server = mockito::Server::new_async().await;
        let token = token_mock(&mut server).await;
        let completion = server
            .mock("POST", "/v1/wca/codegen/ansible")
            .match_header("authorization", "Bearer T1")
            .with_status(200)
            .with_body(r#"{"predictions":["  ansible.builtin.apt:\n    name: apache2"]}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server);
        let envelope = tenant_envelope(CompletionRequest {
            context: String::new(),
            prompt: "- name: install apache".to_string(),
        });

        let response = pipeline.complete(&envelope).await.unwrap();

        token.assert_async().await;
        completion.assert_async().await;
        assert_eq!(response.model_id, "M1");
        assert_eq!(response.predictions.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_surfaces_token_failure_with_model_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"errorMessage":"Provided API key could not be found."}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server);
        let envelope = tenant_envelope(CompletionRequest::default());
        let result = pipeline.complete(&envelope).await;

        match result {
            Err(PipelineError::TokenApiKeyError { model_id }) => {
                assert_eq!(model_id.as_deref(), Some("M1"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_credential_failure_short_circuits_before_http() {
        let server = mockito::Server::new_async().await;
        // No token or inference mocks: resolution must fail first.
        let pipeline = pipeline(&server);

        let user = UserIdentity::new(Uuid::new_v4());
        let envelope = RequestEnvelope::new(user, CompletionRequest::default());
        let result = pipeline.complete(&envelope).await;

        assert!(matches!(result, Err(PipelineError::KeyNotFound)));
    }

    #[tokio::test]
    async fn test_content_match_posts_suggestions() {
        let mut server = mockito::Server::new_async().await;
        token_mock(&mut server).await;
        let codematch = server
            .mock("POST", "/v1/wca/codematch/ansible")
            .match_header("authorization", "Bearer T1")
            .with_status(200)
            .with_body(r#"{"code_matches":[{"repo_name":"x","score":0.9}]}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server);
        let envelope = tenant_envelope(ContentMatchRequest {
            suggestions: vec!["- name: install apache".to_string()],
        });

        let response = pipeline.content_match(&envelope).await.unwrap();

        codematch.assert_async().await;
        assert_eq!(response.model_id, "M1");
        assert!(response.body["code_matches"].is_array());
    }

    #[tokio::test]
    async fn test_generate_playbook_runs_lint() {
        struct MarkerLinter;

        #[async_trait]
        impl PlaybookLinter for MarkerLinter {
            async fn run(&self, playbook: String) -> anyhow::Result<String> {
                Ok(format!("{playbook}# linted\n"))
            }
        }

        let mut server = mockito::Server::new_async().await;
        token_mock(&mut server).await;
        server
            .mock("POST", "/v1/wca/codegen/ansible/playbook")
            .with_status(200)
            .with_body(r#"{"playbook":"---\n- hosts: all\n","outline":"1. step","warnings":[]}"#)
            .create_async()
            .await;

        let config = saas_config(server.url(), server.url());
        let deps = PipelineDeps::new(Arc::new(SingleTenantStore), Arc::new(NoopSink))
            .with_linter(Arc::new(MarkerLinter));
        let pipeline = SaasPipeline::new(&config, reqwest::Client::new(), deps).unwrap();

        let envelope = tenant_envelope(PlaybookGenerationRequest {
            text: "install apache".to_string(),
            create_outline: true,
            ..Default::default()
        });
        let response = pipeline.generate_playbook(&envelope).await.unwrap();

        assert!(response.playbook.ends_with("# linted\n"));
        assert_eq!(response.outline, "1. step");
    }

    #[tokio::test]
    async fn test_explain_playbook_returns_text() {
        let mut server = mockito::Server::new_async().await;
        token_mock(&mut server).await;
        server
            .mock("POST", "/v1/wca/explain/ansible/playbook")
            .with_status(200)
            .with_body(r#"{"explanation":"Installs apache."}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server);
        let envelope = tenant_envelope(PlaybookExplanationRequest {
            content: "---\n- hosts: all".to_string(),
            ..Default::default()
        });

        let explanation = pipeline.explain_playbook(&envelope).await.unwrap();
        assert_eq!(explanation, "Installs apache.");
    }

    #[tokio::test]
    async fn test_self_test_requires_health_credentials() {
        let server = mockito::Server::new_async().await;
        let pipeline = pipeline(&server);

        // No health or global credentials configured.
        let result = pipeline.self_test().await;
        assert!(matches!(result, Err(PipelineError::KeyNotFound)));
    }

    #[tokio::test]
    async fn test_self_test_happy_path() {
        let mut server = mockito::Server::new_async().await;
        token_mock(&mut server).await;
        let completion = server
            .mock("POST", "/v1/wca/codegen/ansible")
            .with_status(200)
            .with_body(r#"{"predictions":["  ansible.builtin.dnf:"]}"#)
            .create_async()
            .await;

        let mut config = saas_config(server.url(), server.url());
        config.health_api_key = Some(Secret::new("HK"));
        config.health_model_id = Some("HM".to_string());
        let deps = PipelineDeps::new(Arc::new(SingleTenantStore), Arc::new(NoopSink));
        let pipeline = SaasPipeline::new(&config, reqwest::Client::new(), deps).unwrap();

        pipeline.self_test().await.unwrap();
        completion.assert_async().await;

        let summary = pipeline.health_probe().await;
        assert!(summary.is_healthy());
    }
}
