//! Service traits for the four upstream collaborators.
//!
//! Each trait is the narrowest contract the pipeline needs from an external
//! service. Production implementations live in `adreel-adapters`; tests use
//! the scripted doubles in `adreel_core::testing`.

use async_trait::async_trait;

use crate::error::CampaignError;
use crate::types::{
    AdCopy, DeliveryReceipt, RenderHandle, RenderStatus, UserPreferences, VideoArtifact,
};

/// Read-only lookup of stored personalization attributes.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Fetch preferences for a user.
    ///
    /// Returns `Ok(None)` when the store has no record for the user and
    /// [`CampaignError::UpstreamUnavailable`] on transport failure.
    async fn fetch(&self, user_id: &str) -> Result<Option<UserPreferences>, CampaignError>;
}

/// Produces ad text for a product and audience.
#[async_trait]
pub trait CopyGenerator: Send + Sync {
    /// Generate copy. Fails with [`CampaignError::GenerationFailed`] on
    /// upstream error or blank output.
    async fn generate(
        &self,
        product_name: &str,
        audience: &str,
        goal: &str,
        preferences: &UserPreferences,
    ) -> Result<AdCopy, CampaignError>;
}

/// Remote video rendering, modelled as submit-then-poll.
#[async_trait]
pub trait VideoRenderer: Send + Sync {
    /// Start a render of `copy` using the named template.
    async fn submit(&self, template: &str, copy: &AdCopy) -> Result<RenderHandle, CampaignError>;

    /// Check on a previously submitted render.
    async fn poll(&self, handle: &RenderHandle) -> Result<RenderStatus, CampaignError>;
}

/// Sends the finished campaign to its recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `copy` and `artifact` to `recipient_email`.
    ///
    /// The notifier has no view of job history; callers are responsible for
    /// never sending the same job twice.
    async fn send(
        &self,
        recipient_email: &str,
        copy: &AdCopy,
        artifact: &VideoArtifact,
    ) -> Result<DeliveryReceipt, CampaignError>;
}
