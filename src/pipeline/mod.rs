//! Pipeline abstraction layer.
//!
//! This module provides the [`ModelPipeline`] trait and the four variants
//! that implement it: SaaS (IAM bearer tokens), on-prem (ZenApiKey),
//! plain HTTP, and dummy (canned responses). All variants share the same
//! request skeleton - resolve credentials, build headers and body, execute
//! through the backoff executor, verify the correlation id, classify, map -
//! and differ only in credentialing, authorization headers, and which
//! operations they offer.
//!
//! # Object Safety
//!
//! The trait is object-safe and designed to be used as
//! `Arc<dyn ModelPipeline>`. Operations a variant does not offer keep the
//! default implementation and report [`PipelineError::Unsupported`];
//! callers can probe [`ModelPipeline::capabilities`] instead of catching
//! the error.
//!
//! # Cancellation Safety
//!
//! All operations honor the envelope's cancellation token: an in-flight
//! HTTP attempt is aborted, no further retry starts, and the caller gets a
//! cancellation error distinct from a timeout.

pub mod dummy;
pub mod error;
pub mod factory;
pub mod headers;
pub mod http;
pub mod onprem;
pub mod saas;
pub mod types;

mod wca;

pub use error::PipelineError;
pub use factory::{create_pipeline, PipelineDeps};
pub use types::{
    CompletionRequest, CompletionResponse, ContentMatchRequest, ContentMatchResponse,
    PlaybookExplanationRequest, PlaybookGenerationRequest, PlaybookGenerationResponse,
    RequestEnvelope,
};

use async_trait::async_trait;
use serde::Deserialize;

use crate::health::HealthSummary;

/// Pipeline family discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVariant {
    /// Hosted WCA behind IBM IAM bearer tokens.
    Saas,
    /// Cloud Pak for Data install with ZenApiKey auth.
    OnPrem,
    /// Plain HTTP model server, completions only.
    Http,
    /// Canned responses for development and demos.
    Dummy,
}

/// Which operations a pipeline instance offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineCapabilities {
    pub completions: bool,
    pub content_match: bool,
    pub playbook_generation: bool,
    pub playbook_explanation: bool,
}

impl PipelineCapabilities {
    pub const ALL: Self = Self {
        completions: true,
        content_match: true,
        playbook_generation: true,
        playbook_explanation: true,
    };

    pub const COMPLETIONS_ONLY: Self = Self {
        completions: true,
        content_match: false,
        playbook_generation: false,
        playbook_explanation: false,
    };
}

/// Collaborator that scrubs PII from free text before transmission.
///
/// A pure string transformation; the pipeline applies it to every
/// free-text field of generation and explanation requests.
pub trait Anonymizer: Send + Sync {
    fn anonymize(&self, text: &str) -> String;
}

/// Collaborator that post-processes generated playbooks (lint).
#[async_trait]
pub trait PlaybookLinter: Send + Sync {
    async fn run(&self, playbook: String) -> anyhow::Result<String>;
}

/// Unified interface for the four pipeline variants.
#[async_trait]
pub trait ModelPipeline: Send + Sync + 'static {
    /// Which variant this instance is.
    fn variant(&self) -> PipelineVariant;

    /// Which operations this instance offers.
    fn capabilities(&self) -> PipelineCapabilities;

    /// Code completion against the codegen endpoint.
    async fn complete(
        &self,
        _envelope: &RequestEnvelope<CompletionRequest>,
    ) -> Result<CompletionResponse, PipelineError> {
        Err(PipelineError::Unsupported("completions"))
    }

    /// Attribution lookup for a set of suggestions.
    async fn content_match(
        &self,
        _envelope: &RequestEnvelope<ContentMatchRequest>,
    ) -> Result<ContentMatchResponse, PipelineError> {
        Err(PipelineError::Unsupported("content_match"))
    }

    /// Full playbook generation, optionally with an outline.
    async fn generate_playbook(
        &self,
        _envelope: &RequestEnvelope<PlaybookGenerationRequest>,
    ) -> Result<PlaybookGenerationResponse, PipelineError> {
        Err(PipelineError::Unsupported("playbook_generation"))
    }

    /// Natural-language explanation of a playbook.
    async fn explain_playbook(
        &self,
        _envelope: &RequestEnvelope<PlaybookExplanationRequest>,
    ) -> Result<String, PipelineError> {
        Err(PipelineError::Unsupported("playbook_explanation"))
    }

    /// Exercise the full stack with reserved health credentials and a
    /// canned prompt.
    async fn self_test(&self) -> Result<(), PipelineError>;

    /// Per-subsystem availability, derived from [`Self::self_test`].
    async fn health_probe(&self) -> HealthSummary {
        crate::health::summarize(self.self_test().await)
    }
}
