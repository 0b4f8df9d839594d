//! Response classification shared by every service client.

use std::time::Duration;

use adreel_proto::CampaignError;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Longest slice of an error body kept in error messages.
const MAX_BODY_CHARS: usize = 200;

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

pub(crate) fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Connection errors and timeouts are always worth another try.
pub(crate) fn transport_error(service: &str, err: &reqwest::Error) -> CampaignError {
    CampaignError::unavailable(service, err.to_string())
}

pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Passes a successful response through.
///
/// Server errors and throttling become `UpstreamUnavailable`; any other
/// status is handed to `permanent` to build the stage's own error.
pub(crate) async fn check_status(
    service: &str,
    response: Response,
    permanent: fn(String) -> CampaignError,
) -> std::result::Result<Response, CampaignError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = describe_failure(status, &body);
    if is_transient_status(status) {
        Err(CampaignError::unavailable(service, reason))
    } else {
        Err(permanent(reason))
    }
}

/// Decodes a JSON body; a malformed body is a permanent failure of the stage.
pub(crate) async fn decode<T: DeserializeOwned>(
    response: Response,
    permanent: fn(String) -> CampaignError,
) -> std::result::Result<T, CampaignError> {
    response
        .json::<T>()
        .await
        .map_err(|e| permanent(format!("unexpected response body: {e}")))
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status.to_string();
    }
    let snippet: String = body.chars().take(MAX_BODY_CHARS).collect();
    format!("{status} - {snippet}")
}
