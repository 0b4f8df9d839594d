//! HTTP clients for the four adreel collaborators.
//!
//! Each client implements one of the service traits from `adreel-proto`
//! and maps the remote API's failures onto [`adreel_proto::CampaignError`]:
//! connection errors, throttling and 5xx answers become `UpstreamUnavailable`,
//! everything else becomes the failing stage's own error (`UpstreamRejected`
//! for the preference store, which has no stage error of its own).
//!
//! # Examples
//!
//! ```no_run
//! use adreel_adapters::build_collaborators;
//! use adreel_core::{AdreelConfig, CampaignOrchestrator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AdreelConfig::load_or_default(std::path::Path::new("adreel.yml"))?;
//!     let services = build_collaborators(&config)?;
//!     let _orchestrator = CampaignOrchestrator::new(services, config.pipeline);
//!     Ok(())
//! }
//! ```

mod copywriter;
mod email;
pub mod error;
mod http;
mod preferences;
mod renderer;

pub use copywriter::OpenAiCopyGenerator;
pub use email::EmailNotifier;
pub use error::{AdapterError, Result};
pub use preferences::PostgrestPreferenceStore;
pub use renderer::HttpVideoRenderer;

use std::env;
use std::sync::Arc;

use adreel_core::{AdreelConfig, Collaborators};
use tracing::debug;

/// Builds HTTP clients for every collaborator named in `config`.
///
/// API keys are read from the environment variables the config names,
/// after loading a `.env` file if one exists.
pub fn build_collaborators(config: &AdreelConfig) -> Result<Collaborators> {
    // Missing .env is fine; the variables may come from the real environment.
    let _ = dotenvy::dotenv();
    let lookup = |name: &str| env::var(name).ok();

    let preferences = PostgrestPreferenceStore::new(
        &config.preferences,
        resolve_key(&config.preferences.api_key_env, lookup)?,
    )?;
    let copywriter = OpenAiCopyGenerator::new(
        &config.copywriter,
        resolve_key(&config.copywriter.api_key_env, lookup)?,
    )?;
    let renderer = HttpVideoRenderer::new(
        &config.renderer,
        resolve_key(&config.renderer.api_key_env, lookup)?,
    )?;
    let notifier = EmailNotifier::new(&config.email, resolve_key(&config.email.api_key_env, lookup)?)?;

    debug!(
        preferences = %config.preferences.base_url,
        copywriter = %config.copywriter.base_url,
        renderer = %config.renderer.base_url,
        email = %config.email.base_url,
        "Service clients ready"
    );

    Ok(Collaborators {
        preferences: Arc::new(preferences),
        copywriter: Arc::new(copywriter),
        renderer: Arc::new(renderer),
        notifier: Arc::new(notifier),
    })
}

fn resolve_key(var: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    if var.trim().is_empty() {
        return Err(AdapterError::ConfigError(
            "api_key_env must name an environment variable".to_string(),
        ));
    }
    lookup(var)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AdapterError::MissingCredential(var.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_key() {
        let lookup = |name: &str| match name {
            "SET" => Some(" secret \n".to_string()),
            "BLANK" => Some("   ".to_string()),
            _ => None,
        };

        assert_eq!(resolve_key("SET", lookup).unwrap(), "secret");
        assert!(matches!(
            resolve_key("BLANK", lookup),
            Err(AdapterError::MissingCredential(var)) if var == "BLANK"
        ));
        assert!(matches!(
            resolve_key("UNSET", lookup),
            Err(AdapterError::MissingCredential(_))
        ));
        assert!(matches!(resolve_key("", lookup), Err(AdapterError::ConfigError(_))));
    }
}
