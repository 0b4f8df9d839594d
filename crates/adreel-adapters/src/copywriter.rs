//! Ad copy from an OpenAI-compatible chat completions endpoint.

use adreel_core::CopywriterConfig;
use adreel_proto::{AdCopy, CampaignError, CopyGenerator, UserPreferences};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::http::{build_client, check_status, decode, transport_error, trim_base_url};

const SERVICE: &str = "copywriter";

const SYSTEM_PROMPT: &str = "You write short, punchy video ad scripts. \
Reply with the script text only: no quotes, no hashtags, no stage directions.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAiCopyGenerator {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: String,
}

impl OpenAiCopyGenerator {
    pub fn new(config: &CopywriterConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: trim_base_url(&config.base_url),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api_key,
        })
    }
}

#[async_trait]
impl CopyGenerator for OpenAiCopyGenerator {
    async fn generate(
        &self,
        product_name: &str,
        audience: &str,
        goal: &str,
        preferences: &UserPreferences,
    ) -> std::result::Result<AdCopy, CampaignError> {
        let prompt = build_prompt(product_name, audience, goal, preferences);
        debug!(model = %self.model, prompt_chars = prompt.len(), "Requesting ad copy");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, &e))?;

        let response = check_status(SERVICE, response, CampaignError::GenerationFailed).await?;
        let body: ChatResponse = decode(response, CampaignError::GenerationFailed).await?;

        let text = extract_copy(body)?;
        info!(chars = text.len(), "Ad copy generated");
        Ok(AdCopy::new(text))
    }
}

/// Builds the user prompt. Preferences are listed in key order so the same
/// inputs always produce the same prompt.
pub(crate) fn build_prompt(
    product_name: &str,
    audience: &str,
    goal: &str,
    preferences: &UserPreferences,
) -> String {
    let mut prompt = format!(
        "Write a 15-second video ad script for {product_name}.\n\
         Audience: {audience}\n\
         Goal: {goal}\n"
    );

    if !preferences.is_empty() {
        prompt.push_str("Viewer preferences:\n");
        for (key, value) in &preferences.attributes {
            prompt.push_str(&format!("- {key}: {value}\n"));
        }
    }

    prompt.push_str("Keep it under 40 words.");
    prompt
}

fn extract_copy(body: ChatResponse) -> std::result::Result<String, CampaignError> {
    let text = body
        .choices
        .into_iter()
        .next()
        .map(|choice| clean_copy(&choice.message.content))
        .unwrap_or_default();

    if text.is_empty() {
        return Err(CampaignError::GenerationFailed(
            "model returned no usable text".to_string(),
        ));
    }
    Ok(text)
}

/// Trims whitespace and the wrapping quotes models like to add.
fn clean_copy(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}
