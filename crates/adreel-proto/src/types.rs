use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CampaignError;

/// Input for one campaign job. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRequest {
    pub user_id: String,
    pub product_name: String,
    pub audience: String,
    /// Campaign goal; the orchestrator substitutes its configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub recipient_email: String,
}

impl CampaignRequest {
    /// Checks the request before any upstream call is made.
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.user_id.trim().is_empty() {
            return Err(CampaignError::InvalidRequest("user_id is empty".into()));
        }
        if self.product_name.trim().is_empty() {
            return Err(CampaignError::InvalidRequest("product_name is empty".into()));
        }
        if self.audience.trim().is_empty() {
            return Err(CampaignError::InvalidRequest("audience is empty".into()));
        }
        if !looks_like_email(&self.recipient_email) {
            return Err(CampaignError::InvalidRequest(format!(
                "recipient_email {:?} is not an email address",
                self.recipient_email
            )));
        }
        Ok(())
    }

    /// The goal if one was given and is not blank.
    pub fn goal(&self) -> Option<&str> {
        self.goal
            .as_deref()
            .map(str::trim)
            .filter(|goal| !goal.is_empty())
    }
}

fn looks_like_email(address: &str) -> bool {
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// A single stored personalization value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for PreferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Personalization attributes for one user, as held by the preference store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, PreferenceValue>,
}

impl UserPreferences {
    /// Preferences with no attributes, used when the user has none stored.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Builder-style helper for assembling preferences in code and tests.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: PreferenceValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Generated advertising copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdCopy {
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

impl AdCopy {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generated_at: Utc::now(),
        }
    }

    /// True when the text carries nothing worth rendering.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A finished video produced from ad copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub url: String,
    /// Length of the rendered video, when the renderer reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// Opaque identifier of a submitted render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderHandle(pub String);

impl RenderHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of polling a render job.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderStatus {
    /// Still queued or rendering.
    Pending,
    /// Rendering finished.
    Done(VideoArtifact),
    /// Rendering stopped with a terminal error.
    Failed(String),
}

/// Acknowledgement returned by the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}
