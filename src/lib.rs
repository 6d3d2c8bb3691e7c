//! Wisdom Pipeline - tenant-aware model pipeline core for AI-assisted
//! Ansible content.
//!
//! This library is the client-side orchestration layer between a content
//! service and the WCA inference platform. It routes code completion,
//! content match, playbook generation, and playbook explanation requests
//! through one of four pipeline variants (SaaS, on-prem, HTTP, dummy),
//! handling tenant credential resolution, IAM token lifecycle, retry with
//! exponential backoff, request-id correlation, and response
//! classification into an actionable failure taxonomy.
//!
//! The core is stateless across requests apart from each pipeline
//! instance's HTTP connection pool and the optional SaaS token cache.
//! Everything it collaborates with - secret store, telemetry sink,
//! anonymizer, lint post-processor - is passed in at construction.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wisdom::config::PipelineConfig;
//! use wisdom::pipeline::{create_pipeline, CompletionRequest, PipelineDeps, RequestEnvelope};
//! use wisdom::resolver::{DisabledSecretStore, UserIdentity};
//! use wisdom::retry::MetricsSink;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::load(Some("pipeline.toml".as_ref()))?.with_env_overrides();
//! let deps = PipelineDeps::new(Arc::new(DisabledSecretStore), Arc::new(MetricsSink));
//! let pipeline = create_pipeline(&config, deps)?;
//!
//! let user = UserIdentity::new(uuid::Uuid::new_v4());
//! let envelope = RequestEnvelope::new(user, CompletionRequest {
//!     context: "---\n- hosts: all\n  tasks:\n".to_string(),
//!     prompt: "  - name: install apache\n".to_string(),
//! });
//! let completion = pipeline.complete(&envelope).await?;
//! println!("{}", completion.predictions.join("\n"));
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod resolver;
pub mod retry;
pub mod secret;
pub mod token;

// Re-export the types most callers need.
pub use config::PipelineConfig;
pub use pipeline::{
    create_pipeline, CompletionRequest, CompletionResponse, ContentMatchRequest,
    ContentMatchResponse, ModelPipeline, PipelineDeps, PipelineError, PipelineVariant,
    PlaybookExplanationRequest, PlaybookGenerationRequest, PlaybookGenerationResponse,
    RequestEnvelope,
};
pub use secret::Secret;
