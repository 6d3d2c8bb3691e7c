//! Health probing for the pipeline stack.
//!
//! A probe runs the variant's `self_test`, which posts a canned completion
//! with the reserved health credentials, and folds the outcome into a
//! per-subsystem summary. An [`PipelineError::InferenceFailure`] means the
//! call reached the platform and the platform failed, so only the models
//! subsystem is down; any other error means the call could not even be
//! attempted (token exchange, credentials, network), which takes both
//! subsystems down.

use crate::pipeline::PipelineError;

/// Canned context for the probe completion.
pub const PROBE_CONTEXT: &str = "---\n- hosts: all\n  tasks:\n";

/// Canned prompt for the probe completion.
pub const PROBE_PROMPT: &str = "  - name: install ffmpeg on Red Hat Enterprise Linux\n";

/// Availability of one subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Ok,
    Unavailable { reason: String },
}

impl ProbeStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeStatus::Ok)
    }

    fn unavailable(reason: &impl ToString) -> Self {
        ProbeStatus::Unavailable {
            reason: reason.to_string(),
        }
    }
}

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    /// Token exchange / credential path.
    pub tokens: ProbeStatus,
    /// The inference platform itself.
    pub models: ProbeStatus,
}

impl HealthSummary {
    pub fn healthy() -> Self {
        Self {
            tokens: ProbeStatus::Ok,
            models: ProbeStatus::Ok,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.tokens.is_ok() && self.models.is_ok()
    }
}

/// Fold a self-test outcome into a per-subsystem summary.
pub fn summarize(result: Result<(), PipelineError>) -> HealthSummary {
    match result {
        Ok(()) => HealthSummary::healthy(),
        Err(err @ PipelineError::InferenceFailure { .. }) => HealthSummary {
            tokens: ProbeStatus::Ok,
            models: ProbeStatus::unavailable(&err),
        },
        Err(err) => HealthSummary {
            tokens: ProbeStatus::unavailable(&err),
            models: ProbeStatus::unavailable(&err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_probe_is_healthy() {
        let summary = summarize(Ok(()));
        assert!(summary.is_healthy());
    }

    #[test]
    fn test_inference_failure_takes_models_down_only() {
        let summary = summarize(Err(PipelineError::InferenceFailure { model_id: None }));
        assert!(summary.tokens.is_ok());
        assert!(!summary.models.is_ok());
    }

    #[test]
    fn test_token_failure_takes_both_down() {
        let summary = summarize(Err(PipelineError::TokenFailure { model_id: None }));
        assert!(!summary.tokens.is_ok());
        assert!(!summary.models.is_ok());
    }

    #[test]
    fn test_missing_credentials_take_both_down() {
        let summary = summarize(Err(PipelineError::KeyNotFound));
        assert!(!summary.is_healthy());
        match summary.tokens {
            ProbeStatus::Unavailable { ref reason } => {
                assert!(reason.contains("API key"));
            }
            _ => panic!("expected unavailable"),
        }
    }
}
