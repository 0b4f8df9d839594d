//! Campaign orchestration.
//!
//! The orchestrator drives a [`CampaignJob`] through its stages, one upstream
//! call per stage, and owns every retry and failure decision. A failure never
//! discards the output of an earlier stage: the failed job is handed back to
//! the caller with everything produced so far, and [`CampaignOrchestrator::resume`]
//! or [`CampaignOrchestrator::deliver`] continue from there.

mod render;

use std::sync::Arc;

use adreel_proto::{
    AdCopy, CampaignError, CampaignRequest, CopyGenerator, DeliveryReceipt, Notifier,
    PreferenceStore, UserPreferences, VideoArtifact, VideoRenderer,
};
use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::PipelineConfig;
use crate::job::{CampaignJob, JobStatus, PreferenceSource};
use crate::retry::{retry_with_backoff, until_cancelled};

/// Observer notified of every job snapshot the orchestrator produces.
///
/// Called from inside the pipeline, so implementations must not block the
/// executor.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn record(&self, job: &CampaignJob);

    /// Records `next`, a new run of the stored job `loaded`, unless the job
    /// moved on since `loaded` was read.
    ///
    /// Returns the newer snapshot when another run got there first.
    async fn claim(&self, loaded: &CampaignJob, next: &CampaignJob) -> Option<CampaignJob> {
        let _ = loaded;
        self.record(next).await;
        None
    }
}

/// The four upstream services a campaign needs.
#[derive(Clone)]
pub struct Collaborators {
    pub preferences: Arc<dyn PreferenceStore>,
    pub copywriter: Arc<dyn CopyGenerator>,
    pub renderer: Arc<dyn VideoRenderer>,
    pub notifier: Arc<dyn Notifier>,
}

/// A job that ended in `failed`, with the error that stopped it.
#[derive(Debug, thiserror::Error)]
#[error("campaign job {} failed: {error}", job.job_id())]
pub struct JobFailure {
    pub job: Box<CampaignJob>,
    pub error: CampaignError,
}

impl JobFailure {
    fn new(job: CampaignJob, error: CampaignError) -> Self {
        Self {
            job: Box::new(job),
            error,
        }
    }
}

/// Outcome of a single job run.
pub type JobOutcome = Result<CampaignJob, JobFailure>;

/// Sequences the pipeline stages for campaign jobs.
///
/// Cloning is cheap; clones share the same service clients.
#[derive(Clone)]
pub struct CampaignOrchestrator {
    services: Collaborators,
    config: PipelineConfig,
    sink: Option<Arc<dyn JobSink>>,
}

impl CampaignOrchestrator {
    pub fn new(services: Collaborators, config: PipelineConfig) -> Self {
        Self {
            services,
            config,
            sink: None,
        }
    }

    /// Attaches an observer that receives every job snapshot.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn JobSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs a new job for `request` to `sent` or `failed`.
    ///
    /// Malformed requests are rejected with [`CampaignError::InvalidRequest`]
    /// before any upstream call or sink notification.
    pub async fn run(&self, request: CampaignRequest, cancel: &CancellationToken) -> JobOutcome {
        let mut job = CampaignJob::new(request);
        let span = info_span!("campaign_job", job_id = %job.job_id(), attempt = job.attempt());

        async move {
            if let Err(error) = job.request().validate() {
                warn!(%error, "Rejecting campaign request");
                job.mark_failed(&error);
                return Err(JobFailure::new(job, error));
            }

            info!(
                user_id = %job.request().user_id,
                product = %job.request().product_name,
                "Starting campaign job"
            );
            self.record(&job).await;
            self.drive(job, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Continues a job from the first stage whose output is missing.
    ///
    /// A `sent` job is returned unchanged. A `failed` job is reopened as a new
    /// attempt at the stage it had reached. A job that failed validation
    /// cannot be resumed.
    pub async fn resume(&self, job: CampaignJob, cancel: &CancellationToken) -> JobOutcome {
        let span = info_span!("campaign_job", job_id = %job.job_id(), attempt = job.attempt());

        async move {
            match job.status() {
                JobStatus::Sent => {
                    info!("Job already sent, nothing to resume");
                    Ok(job)
                }
                JobStatus::Failed => {
                    let reopened = match job.reopen() {
                        Ok(reopened) => reopened,
                        Err(err) => {
                            let error = CampaignError::InvalidRequest(err.to_string());
                            return Err(JobFailure::new(job, error));
                        }
                    };
                    info!(from = %reopened.status(), "Resuming failed job");
                    if let Some(current) = self.claim(&job, &reopened).await {
                        return Self::superseded(current);
                    }
                    self.drive(reopened, cancel).await
                }
                status => {
                    info!(from = %status, "Resuming interrupted job");
                    self.drive(job, cancel).await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Re-runs only the delivery stage for a job that already has its video.
    ///
    /// Returns a `sent` job unchanged without contacting the notifier, so
    /// calling this twice never produces a second delivery.
    pub async fn deliver(&self, job: CampaignJob, cancel: &CancellationToken) -> JobOutcome {
        if job.status() == JobStatus::Sent {
            debug!(job_id = %job.job_id(), "Job already sent, skipping delivery");
            return Ok(job);
        }

        if job.stage_reached() != JobStatus::VideoRendered {
            let error = CampaignError::InvalidRequest(format!(
                "job {} has reached {}, delivery needs video_rendered",
                job.job_id(),
                job.stage_reached()
            ));
            return Err(JobFailure::new(job, error));
        }

        let next = if job.status() == JobStatus::Failed {
            match job.reopen() {
                Ok(reopened) => reopened,
                Err(err) => {
                    let error = CampaignError::InvalidRequest(err.to_string());
                    return Err(JobFailure::new(job, error));
                }
            }
        } else {
            job.clone()
        };

        let span = info_span!("campaign_job", job_id = %next.job_id(), attempt = next.attempt());
        async move {
            info!("Retrying delivery only");
            if let Some(current) = self.claim(&job, &next).await {
                return Self::superseded(current);
            }
            self.drive(next, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Runs independent jobs concurrently, at most
    /// `max_concurrent_jobs` at a time, on the current task.
    ///
    /// Outcomes are returned in the order of `requests`. Each job gets a
    /// child of `cancel`, so cancelling the parent stops them all.
    pub async fn run_batch(
        &self,
        requests: Vec<CampaignRequest>,
        cancel: &CancellationToken,
    ) -> Vec<JobOutcome> {
        let limit = self.config.max_concurrent_jobs.max(1);
        info!(jobs = requests.len(), limit, "Starting campaign batch");

        futures::stream::iter(requests)
            .map(|request| {
                let child = cancel.child_token();
                async move { self.run(request, &child).await }
            })
            .buffered(limit)
            .collect()
            .await
    }

    /// Advances `job` stage by stage until it is sent or fails.
    ///
    /// Cancellation is checked before every stage transition.
    async fn drive(&self, mut job: CampaignJob, cancel: &CancellationToken) -> JobOutcome {
        while job.status() != JobStatus::Sent {
            if cancel.is_cancelled() {
                return Err(self.fail(job, CampaignError::Cancelled).await);
            }

            let outcome = match job.status() {
                JobStatus::Pending => {
                    let fetched = self.fetch_preferences(&job, cancel).await;
                    fetched.map(|(preferences, source)| job.record_preferences(preferences, source))
                }
                JobStatus::PreferencesFetched => {
                    let generated = self.generate_copy(&job, cancel).await;
                    generated.map(|copy| job.record_copy(copy))
                }
                JobStatus::CopyGenerated => {
                    let rendered = self.render_video(&job, cancel).await;
                    rendered.map(|artifact| job.record_artifact(artifact))
                }
                JobStatus::VideoRendered => {
                    let delivered = self.send_notification(&job, cancel).await;
                    delivered.map(|receipt| job.record_delivery(receipt))
                }
                JobStatus::Sent | JobStatus::Failed => break,
            };

            match outcome {
                Ok(()) => {
                    info!(status = %job.status(), "Stage complete");
                    self.record(&job).await;
                }
                Err(error) => return Err(self.fail(job, error).await),
            }
        }

        Ok(job)
    }

    /// Best-effort preference lookup; never fails the job except on cancel.
    ///
    /// Only transient errors are retried; a rejection falls back at once.
    async fn fetch_preferences(
        &self,
        job: &CampaignJob,
        cancel: &CancellationToken,
    ) -> Result<(UserPreferences, PreferenceSource), CampaignError> {
        let user_id = job.request().user_id.as_str();
        let policy = self.config.preference_retry_policy();
        let store = &self.services.preferences;

        let fetched = retry_with_backoff(&policy, cancel, "preferences.fetch", |attempt| {
            debug!(user_id, attempt, "Fetching preferences");
            store.fetch(user_id)
        })
        .await;

        match fetched {
            Ok(Some(preferences)) => {
                debug!(attributes = preferences.attributes.len(), "Preferences found");
                Ok((preferences, PreferenceSource::Stored))
            }
            Ok(None) => {
                info!(user_id, "No stored preferences, continuing without personalization");
                Ok((UserPreferences::empty(user_id), PreferenceSource::NotFound))
            }
            Err(CampaignError::Cancelled) => Err(CampaignError::Cancelled),
            Err(err) => {
                warn!(user_id, error = %err, "Preferences not available, continuing without personalization");
                Ok((
                    UserPreferences::empty(user_id),
                    PreferenceSource::Unavailable {
                        reason: err.to_string(),
                    },
                ))
            }
        }
    }

    /// Generates copy. Blank output is a failure, never a valid result.
    async fn generate_copy(
        &self,
        job: &CampaignJob,
        cancel: &CancellationToken,
    ) -> Result<AdCopy, CampaignError> {
        let request = job.request();
        let goal = request.goal().unwrap_or(&self.config.default_goal);
        let empty;
        let preferences = match job.preferences() {
            Some(preferences) => preferences,
            None => {
                empty = UserPreferences::empty(&request.user_id);
                &empty
            }
        };

        debug!(goal, "Generating ad copy");
        let copy = until_cancelled(
            cancel,
            self.services.copywriter.generate(
                &request.product_name,
                &request.audience,
                goal,
                preferences,
            ),
        )
        .await
        .map_err(|err| match err {
            CampaignError::Cancelled | CampaignError::GenerationFailed(_) => err,
            other => CampaignError::GenerationFailed(other.to_string()),
        })?;

        if copy.is_blank() {
            return Err(CampaignError::GenerationFailed(
                "generator returned blank copy".to_string(),
            ));
        }

        Ok(copy)
    }

    /// Sends the finished campaign, at most once per job.
    async fn send_notification(
        &self,
        job: &CampaignJob,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReceipt, CampaignError> {
        let (Some(copy), Some(artifact)) = (job.copy(), job.artifact()) else {
            return Err(CampaignError::DeliveryFailed(
                "job has no copy or video to deliver".to_string(),
            ));
        };
        let recipient = job.request().recipient_email.as_str();

        debug!(recipient, url = %artifact.url, "Sending campaign");
        let receipt = until_cancelled(
            cancel,
            self.services.notifier.send(recipient, copy, artifact),
        )
        .await
        .map_err(|err| match err {
            CampaignError::Cancelled | CampaignError::DeliveryFailed(_) => err,
            other => CampaignError::DeliveryFailed(other.to_string()),
        })?;

        if !receipt.accepted {
            return Err(CampaignError::DeliveryFailed(format!(
                "notifier did not accept message to {recipient}"
            )));
        }

        info!(message_id = ?receipt.message_id, "Campaign delivered");
        Ok(receipt)
    }

    async fn render_video(
        &self,
        job: &CampaignJob,
        cancel: &CancellationToken,
    ) -> Result<VideoArtifact, CampaignError> {
        let Some(copy) = job.copy() else {
            return Err(CampaignError::RenderFailed(
                "job has no copy to render".to_string(),
            ));
        };
        render::render_with_retry(self.services.renderer.as_ref(), &self.config, copy, cancel).await
    }

    async fn fail(&self, mut job: CampaignJob, error: CampaignError) -> JobFailure {
        job.mark_failed(&error);
        warn!(
            job_id = %job.job_id(),
            stage_reached = %job.stage_reached(),
            kind = %error.kind(),
            %error,
            "Campaign job failed"
        );
        self.record(&job).await;
        JobFailure::new(job, error)
    }

    async fn record(&self, job: &CampaignJob) {
        if let Some(sink) = &self.sink {
            sink.record(job).await;
        }
    }

    async fn claim(&self, loaded: &CampaignJob, next: &CampaignJob) -> Option<CampaignJob> {
        match &self.sink {
            Some(sink) => sink.claim(loaded, next).await,
            None => None,
        }
    }

    /// Outcome for a job another run took over after it was loaded.
    fn superseded(current: CampaignJob) -> JobOutcome {
        if current.status() == JobStatus::Sent {
            info!(job_id = %current.job_id(), "Job was sent by another run");
            return Ok(current);
        }

        warn!(
            job_id = %current.job_id(),
            attempt = current.attempt(),
            status = %current.status(),
            "Job changed since it was loaded, not running it again"
        );
        let error = CampaignError::InvalidRequest(format!(
            "job {} is already at attempt {} ({}) in another run",
            current.job_id(),
            current.attempt(),
            current.status()
        ));
        Err(JobFailure::new(current, error))
    }
}
