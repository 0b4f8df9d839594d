//! Submit-then-poll rendering with bounded resubmission.

use std::time::Duration;

use adreel_proto::{AdCopy, CampaignError, RenderHandle, RenderStatus, VideoArtifact, VideoRenderer};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::retry::{sleep_or_cancel, until_cancelled};

/// Growth applied to the poll interval after each pending poll.
const POLL_BACKOFF_FACTOR: f64 = 1.5;

/// Renders `copy`, resubmitting after timeouts up to `render_attempts` times.
///
/// Permanent failures end the stage immediately. Every error that leaves
/// this function is one of `RenderFailed`, `RenderTimeout`, or `Cancelled`.
pub(super) async fn render_with_retry(
    renderer: &dyn VideoRenderer,
    config: &PipelineConfig,
    copy: &AdCopy,
    cancel: &CancellationToken,
) -> Result<VideoArtifact, CampaignError> {
    let policy = config.render_retry_policy();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match until_cancelled(cancel, renderer.submit(&config.render_template, copy)).await
        {
            Ok(handle) => {
                info!(%handle, attempt, "Render submitted");
                await_render(renderer, &handle, config, cancel).await
            }
            Err(err) => Err(normalize(err)),
        };

        match outcome {
            Ok(artifact) => return Ok(artifact),
            Err(err @ CampaignError::RenderTimeout { .. }) if attempt < max_attempts => {
                let delay = policy.backoff_for_attempt(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Render timed out, resubmitting"
                );
                sleep_or_cancel(cancel, delay).await?;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Polls a submitted render until it finishes, fails, or exceeds
/// `render_timeout_secs`.
///
/// Transient poll errors are tolerated; polling is a read and is safe to repeat.
async fn await_render(
    renderer: &dyn VideoRenderer,
    handle: &RenderHandle,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<VideoArtifact, CampaignError> {
    let started = Instant::now();
    let deadline = started + config.render_timeout();
    let mut interval = config.poll_interval();
    let max_interval = config.max_poll_interval();

    loop {
        let status = until_cancelled(cancel, renderer.poll(handle)).await;

        match status {
            Ok(RenderStatus::Done(artifact)) => {
                if artifact.url.trim().is_empty() {
                    return Err(CampaignError::RenderFailed(format!(
                        "render {handle} finished without a video url"
                    )));
                }
                info!(%handle, url = %artifact.url, "Render finished");
                return Ok(artifact);
            }
            Ok(RenderStatus::Failed(reason)) => {
                return Err(CampaignError::RenderFailed(reason));
            }
            Ok(RenderStatus::Pending) => {
                debug!(%handle, "Render still in progress");
            }
            Err(err @ CampaignError::UpstreamUnavailable { .. }) => {
                warn!(%handle, error = %err, "Render poll failed, will poll again");
            }
            Err(err) => return Err(normalize(err)),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(CampaignError::RenderTimeout {
                waited_secs: now.duration_since(started).as_secs(),
            });
        }

        sleep_or_cancel(cancel, interval.min(deadline - now)).await?;
        interval = next_interval(interval, max_interval);
    }
}

fn next_interval(current: Duration, max: Duration) -> Duration {
    current.mul_f64(POLL_BACKOFF_FACTOR).min(max)
}

/// Folds renderer errors into the render stage's own variants.
fn normalize(err: CampaignError) -> CampaignError {
    match err {
        CampaignError::Cancelled
        | CampaignError::RenderFailed(_)
        | CampaignError::RenderTimeout { .. } => err,
        other => CampaignError::RenderFailed(other.to_string()),
    }
}
