//! Pipeline factory: configuration + collaborators in, trait object out.
//!
//! All collaborators are explicit constructor parameters; the pipeline
//! never reaches into process-global state for its secret store,
//! telemetry, anonymizer, or linter.

use std::sync::Arc;

use reqwest::Client;

use crate::config::{ConfigError, PipelineConfig};
use crate::resolver::SecretStore;
use crate::retry::TelemetrySink;

use super::dummy::DummyPipeline;
use super::http::HttpPipeline;
use super::onprem::OnPremPipeline;
use super::saas::SaasPipeline;
use super::{Anonymizer, ModelPipeline, PipelineVariant, PlaybookLinter};

/// Collaborators a pipeline is constructed with.
pub struct PipelineDeps {
    pub secret_store: Arc<dyn SecretStore>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub anonymizer: Option<Arc<dyn Anonymizer>>,
    pub linter: Option<Arc<dyn PlaybookLinter>>,
}

impl PipelineDeps {
    pub fn new(secret_store: Arc<dyn SecretStore>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            secret_store,
            telemetry,
            anonymizer: None,
            linter: None,
        }
    }

    pub fn with_anonymizer(mut self, anonymizer: Arc<dyn Anonymizer>) -> Self {
        self.anonymizer = Some(anonymizer);
        self
    }

    pub fn with_linter(mut self, linter: Arc<dyn PlaybookLinter>) -> Self {
        self.linter = Some(linter);
        self
    }
}

/// Create a pipeline from configuration.
///
/// Validates the configuration, builds the shared HTTP client (one
/// connection pool per pipeline instance), and returns the variant as an
/// `Arc<dyn ModelPipeline>` ready to be shared across request handlers.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use wisdom::config::PipelineConfig;
/// use wisdom::pipeline::{create_pipeline, PipelineDeps, PipelineVariant};
/// use wisdom::resolver::DisabledSecretStore;
/// use wisdom::retry::NoopSink;
///
/// let config = PipelineConfig::default(); // dummy variant
/// let deps = PipelineDeps::new(Arc::new(DisabledSecretStore), Arc::new(NoopSink));
/// let pipeline = create_pipeline(&config, deps).unwrap();
/// assert_eq!(pipeline.variant(), PipelineVariant::Dummy);
/// ```
pub fn create_pipeline(
    config: &PipelineConfig,
    deps: PipelineDeps,
) -> Result<Arc<dyn ModelPipeline>, ConfigError> {
    config.validate()?;

    match config.variant {
        PipelineVariant::Saas => {
            let client = build_client(config);
            Ok(Arc::new(SaasPipeline::new(config, client, deps)?))
        }
        PipelineVariant::OnPrem => {
            let client = build_client(config);
            Ok(Arc::new(OnPremPipeline::new(config, client, deps)?))
        }
        PipelineVariant::Http => {
            let client = build_client(config);
            Ok(Arc::new(HttpPipeline::new(config, client, deps)?))
        }
        PipelineVariant::Dummy => Ok(Arc::new(DummyPipeline::new(config))),
    }
}

fn build_client(config: &PipelineConfig) -> Client {
    Client::builder()
        .danger_accept_invalid_certs(!config.verify_tls)
        .build()
        .expect("Failed to build HTTP client")
}
