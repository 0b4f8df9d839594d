//! Error taxonomy shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the campaign pipeline and its upstream services.
///
/// Service implementations return these directly; the orchestrator
/// normalizes whatever a stage reports into the variant owned by that stage
/// before recording it on the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CampaignError {
    /// The caller supplied a malformed request. Never retried.
    #[error("invalid campaign request: {0}")]
    InvalidRequest(String),

    /// An upstream service could not be reached or answered with a server error.
    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// An upstream service refused the call (bad credentials, unknown
    /// resource). Trying again gives the same answer.
    #[error("{service} rejected the request: {reason}")]
    UpstreamRejected { service: String, reason: String },

    /// Copy generation failed or produced blank output.
    #[error("copy generation failed: {0}")]
    GenerationFailed(String),

    /// The renderer rejected the job or reported a terminal failure.
    #[error("video render failed: {0}")]
    RenderFailed(String),

    /// A render did not finish within its allotted wait.
    #[error("video render timed out after {waited_secs}s")]
    RenderTimeout { waited_secs: u64 },

    /// The notifier refused or failed to deliver the message.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// The caller cancelled the job.
    #[error("campaign job cancelled")]
    Cancelled,
}

impl CampaignError {
    /// Convenience constructor for [`CampaignError::UpstreamUnavailable`].
    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`CampaignError::UpstreamRejected`].
    pub fn rejected(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Returns true when retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::RenderTimeout { .. }
        )
    }

    /// The serializable classification of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::UpstreamUnavailable { .. } => FailureKind::UpstreamUnavailable,
            Self::UpstreamRejected { .. } => FailureKind::UpstreamRejected,
            Self::GenerationFailed(_) => FailureKind::GenerationFailed,
            Self::RenderFailed(_) => FailureKind::RenderFailed,
            Self::RenderTimeout { .. } => FailureKind::RenderTimeout,
            Self::DeliveryFailed(_) => FailureKind::DeliveryFailed,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Classification of a [`CampaignError`], recorded on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    UpstreamUnavailable,
    UpstreamRejected,
    GenerationFailed,
    RenderFailed,
    RenderTimeout,
    DeliveryFailed,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::UpstreamRejected => "upstream_rejected",
            Self::GenerationFailed => "generation_failed",
            Self::RenderFailed => "render_failed",
            Self::RenderTimeout => "render_timeout",
            Self::DeliveryFailed => "delivery_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
