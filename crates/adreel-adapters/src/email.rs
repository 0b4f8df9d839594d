//! Campaign delivery through a Resend-style transactional email API.

use adreel_core::EmailConfig;
use adreel_proto::{AdCopy, CampaignError, DeliveryReceipt, Notifier, VideoArtifact};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::http::{build_client, check_status, decode, transport_error, trim_base_url};

const SERVICE: &str = "email";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

pub struct EmailNotifier {
    client: Client,
    base_url: String,
    from: String,
    subject: String,
    api_key: String,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: trim_base_url(&config.base_url),
            from: config.from.clone(),
            subject: config.subject.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(
        &self,
        recipient_email: &str,
        copy: &AdCopy,
        artifact: &VideoArtifact,
    ) -> std::result::Result<DeliveryReceipt, CampaignError> {
        debug!(recipient = recipient_email, "Sending campaign email");

        let request = SendRequest {
            from: &self.from,
            to: [recipient_email],
            subject: &self.subject,
            html: render_body(copy, artifact),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, &e))?;

        let response = check_status(SERVICE, response, CampaignError::DeliveryFailed).await?;
        let body: SendResponse = decode(response, CampaignError::DeliveryFailed).await?;

        info!(message_id = ?body.id, "Email accepted");
        Ok(DeliveryReceipt {
            accepted: true,
            message_id: body.id,
            sent_at: Utc::now(),
        })
    }
}

pub(crate) fn render_body(copy: &AdCopy, artifact: &VideoArtifact) -> String {
    let text = escape_html(&copy.text);
    let url = escape_html(&artifact.url);
    format!(
        "<p>{text}</p>\n<p><a href=\"{url}\">Watch your video</a></p>\n"
    )
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
