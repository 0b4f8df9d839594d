//! Render service client: submit a template job, then poll it by id.

use adreel_core::RendererConfig;
use adreel_proto::{
    AdCopy, CampaignError, RenderHandle, RenderStatus, VideoArtifact, VideoRenderer,
};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AdapterError, Result};
use crate::http::{build_client, check_status, decode, transport_error, trim_base_url};

const SERVICE: &str = "renderer";

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    template: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RenderStatusData {
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RenderStatusData {
    pub(crate) fn to_status(&self) -> RenderStatus {
        match self.status.as_str() {
            "done" | "completed" | "succeeded" => match &self.url {
                Some(url) if !url.trim().is_empty() => RenderStatus::Done(VideoArtifact {
                    url: url.clone(),
                    duration_seconds: self.duration,
                }),
                _ => RenderStatus::Failed("render finished without a video url".to_string()),
            },
            "pending" | "queued" | "processing" | "rendering" => RenderStatus::Pending,
            _ => RenderStatus::Failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| format!("render ended with status {}", self.status)),
            ),
        }
    }
}

pub struct HttpVideoRenderer {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl HttpVideoRenderer {
    pub fn new(config: &RendererConfig, api_key: String) -> Result<Self> {
        let base_url = Url::parse(&trim_base_url(&config.base_url))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                AdapterError::ConfigError(format!(
                    "renderer base_url is not an http(s) url: {}",
                    config.base_url
                ))
            })?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url,
            api_key,
        })
    }

    /// Appends `segments` to the base url, percent-encoding each one.
    ///
    /// Handles are opaque, so a `/` or `?` inside one must not change which
    /// resource is addressed.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, CampaignError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                CampaignError::RenderFailed(format!("cannot build a url on {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl VideoRenderer for HttpVideoRenderer {
    async fn submit(
        &self,
        template: &str,
        copy: &AdCopy,
    ) -> std::result::Result<RenderHandle, CampaignError> {
        info!(template, "Submitting render");

        let response = self
            .client
            .post(self.endpoint(&["renders"])?)
            .header("x-api-key", &self.api_key)
            .json(&SubmitRequest {
                template,
                text: &copy.text,
            })
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, &e))?;

        let response = check_status(SERVICE, response, CampaignError::RenderFailed).await?;
        let body: SubmitResponse = decode(response, CampaignError::RenderFailed).await?;
        if body.id.trim().is_empty() {
            return Err(CampaignError::RenderFailed(
                "render service returned an empty job id".to_string(),
            ));
        }

        Ok(RenderHandle(body.id))
    }

    async fn poll(&self, handle: &RenderHandle) -> std::result::Result<RenderStatus, CampaignError> {
        debug!(%handle, "Checking render status");

        let response = self
            .client
            .get(self.endpoint(&["renders", handle.as_str()])?)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, &e))?;

        let response = check_status(SERVICE, response, CampaignError::RenderFailed).await?;
        let data: RenderStatusData = decode(response, CampaignError::RenderFailed).await?;
        Ok(data.to_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(json: &str) -> RenderStatusData {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_done_status() {
        let status = data(r#"{"status":"done","url":"https://cdn/x.mp4","duration":15.2}"#).to_status();
        assert_eq!(
            status,
            RenderStatus::Done(VideoArtifact {
                url: "https://cdn/x.mp4".to_string(),
                duration_seconds: Some(15.2),
            })
        );
    }

    #[test]
    fn test_done_without_url_is_failure() {
        assert!(matches!(
            data(r#"{"status":"done"}"#).to_status(),
            RenderStatus::Failed(_)
        ));
    }

    #[test]
    fn test_pending_statuses() {
        for status in ["pending", "queued", "processing", "rendering"] {
            let json = format!(r#"{{"status":"{status}"}}"#);
            assert_eq!(data(&json).to_status(), RenderStatus::Pending);
        }
    }

    #[test]
    fn test_failed_status_carries_error() {
        assert_eq!(
            data(r#"{"status":"failed","error":"template not found"}"#).to_status(),
            RenderStatus::Failed("template not found".to_string())
        );
        assert_eq!(
            data(r#"{"status":"exploded"}"#).to_status(),
            RenderStatus::Failed("render ended with status exploded".to_string())
        );
    }

    fn renderer(base_url: &str) -> HttpVideoRenderer {
        HttpVideoRenderer::new(
            &RendererConfig {
                base_url: base_url.to_string(),
                ..RendererConfig::default()
            },
            "key".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_handle_is_one_encoded_segment() {
        let url = renderer("http://render.local/").endpoint(&["renders", "a/b?c#d"]).unwrap();

        assert_eq!(url.path(), "/renders/a%2Fb%3Fc%23d");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = renderer("https://api.example.com/v2").endpoint(&["renders", "r-1"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/renders/r-1");
    }

    #[test]
    fn test_unusable_base_url_is_config_error() {
        let result = HttpVideoRenderer::new(
            &RendererConfig {
                base_url: "mailto:render@example.com".to_string(),
                ..RendererConfig::default()
            },
            "key".to_string(),
        );
        assert!(matches!(result, Err(AdapterError::ConfigError(_))));
    }

    #[test]
    fn test_submit_request_shape() {
        let json = serde_json::to_value(SubmitRequest {
            template: "ad-default",
            text: "Stay warm, ski hard.",
        })
        .unwrap();
        assert_eq!(json["template"], "ad-default");
        assert_eq!(json["text"], "Stay warm, ski hard.");
    }
}
