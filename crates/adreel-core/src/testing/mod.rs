//! Testing utilities for deterministic pipeline tests.
//!
//! Each double returns pre-scripted responses and records every call, so
//! tests can assert both on the job outcome and on how often each upstream
//! service was contacted.

mod doubles;

pub use doubles::{
    GenerationCall, RecordingNotifier, RenderScript, ScriptedCopyGenerator,
    ScriptedPreferenceStore, ScriptedVideoRenderer, SentMessage,
};

use std::sync::Arc;

use adreel_proto::CampaignRequest;

use crate::orchestrator::Collaborators;

/// The request used throughout the pipeline scenarios.
pub fn sample_request() -> CampaignRequest {
    CampaignRequest {
        user_id: "u1".to_string(),
        product_name: "SkiJacket".to_string(),
        audience: "winter athletes".to_string(),
        goal: Some("sales".to_string()),
        recipient_email: "a@b.com".to_string(),
    }
}

/// Bundles doubles into [`Collaborators`], keeping handles for assertions.
pub fn collaborators(
    preferences: &Arc<ScriptedPreferenceStore>,
    copywriter: &Arc<ScriptedCopyGenerator>,
    renderer: &Arc<ScriptedVideoRenderer>,
    notifier: &Arc<RecordingNotifier>,
) -> Collaborators {
    Collaborators {
        preferences: preferences.clone(),
        copywriter: copywriter.clone(),
        renderer: renderer.clone(),
        notifier: notifier.clone(),
    }
}
