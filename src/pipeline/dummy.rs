//! Dummy pipeline variant.
//!
//! Canned responses for development, demos, and load testing the
//! surrounding service without an upstream. No credentials, no HTTP.
//! An optional simulated latency makes end-to-end timing realistic.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::PipelineConfig;

use super::error::PipelineError;
use super::types::{
    CompletionRequest, CompletionResponse, ContentMatchRequest, ContentMatchResponse,
    PlaybookExplanationRequest, PlaybookGenerationRequest, PlaybookGenerationResponse,
    RequestEnvelope,
};
use super::{ModelPipeline, PipelineCapabilities, PipelineVariant};

const DUMMY_MODEL_ID: &str = "dummy";

const DUMMY_PREDICTION: &str = "    ansible.builtin.package:\n      name: apache2\n      state: present";

const DUMMY_PLAYBOOK: &str = "---\n- name: Install and start Apache\n  hosts: all\n  become: true\n  tasks:\n    - name: Install apache2\n      ansible.builtin.package:\n        name: apache2\n        state: present\n    - name: Start apache2\n      ansible.builtin.service:\n        name: apache2\n        state: started\n";

const DUMMY_OUTLINE: &str = "1. Install the apache2 package\n2. Start the apache2 service\n";

const DUMMY_EXPLANATION: &str = "This playbook installs the apache2 package and ensures the service is started on all targeted hosts.";

pub struct DummyPipeline {
    latency: Duration,
}

impl DummyPipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.dummy_latency_ms),
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn model_id<T>(envelope: &RequestEnvelope<T>) -> String {
        envelope
            .model_id_override
            .clone()
            .unwrap_or_else(|| DUMMY_MODEL_ID.to_string())
    }
}

#[async_trait]
impl ModelPipeline for DummyPipeline {
    fn variant(&self) -> PipelineVariant {
        PipelineVariant::Dummy
    }

    fn capabilities(&self) -> PipelineCapabilities {
        PipelineCapabilities::ALL
    }

    async fn complete(
        &self,
        envelope: &RequestEnvelope<CompletionRequest>,
    ) -> Result<CompletionResponse, PipelineError> {
        self.simulate_latency().await;
        Ok(CompletionResponse {
            predictions: vec![DUMMY_PREDICTION.to_string()],
            model_id: Self::model_id(envelope),
        })
    }

    async fn content_match(
        &self,
        envelope: &RequestEnvelope<ContentMatchRequest>,
    ) -> Result<ContentMatchResponse, PipelineError> {
        self.simulate_latency().await;
        Ok(ContentMatchResponse {
            model_id: Self::model_id(envelope),
            body: serde_json::json!({
                "code_matches": [],
                "suggestions": envelope.input.suggestions.len(),
            }),
        })
    }

    async fn generate_playbook(
        &self,
        envelope: &RequestEnvelope<PlaybookGenerationRequest>,
    ) -> Result<PlaybookGenerationResponse, PipelineError> {
        self.simulate_latency().await;
        Ok(PlaybookGenerationResponse {
            playbook: DUMMY_PLAYBOOK.to_string(),
            outline: if envelope.input.create_outline {
                DUMMY_OUTLINE.to_string()
            } else {
                String::new()
            },
            warnings: Vec::new(),
        })
    }

    async fn explain_playbook(
        &self,
        _envelope: &RequestEnvelope<PlaybookExplanationRequest>,
    ) -> Result<String, PipelineError> {
        self.simulate_latency().await;
        Ok(DUMMY_EXPLANATION.to_string())
    }

    async fn self_test(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
