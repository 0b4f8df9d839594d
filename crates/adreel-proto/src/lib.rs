//! # adreel-proto
//!
//! Shared types, error definitions, and traits for the adreel campaign pipeline.
//!
//! This crate provides the foundational abstractions used across all adreel crates,
//! including:
//! - The campaign data model (requests, preferences, copy, video artifacts)
//! - The error taxonomy every pipeline stage reports through
//! - The narrow service traits for the four upstream collaborators

mod error;
mod services;
mod types;

pub use error::{CampaignError, FailureKind};
pub use services::{CopyGenerator, Notifier, PreferenceStore, VideoRenderer};
pub use types::{
    AdCopy, CampaignRequest, DeliveryReceipt, PreferenceValue, RenderHandle, RenderStatus,
    UserPreferences, VideoArtifact,
};
