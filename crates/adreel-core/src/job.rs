//! The campaign job aggregate and its status lifecycle.
//!
//! A job moves strictly forward through
//! `pending → preferences_fetched → copy_generated → video_rendered → sent`,
//! or stops at `failed`. Outputs of completed stages are kept on the job, so a
//! failed job can be reopened as a new attempt that continues from the last
//! stage it reached instead of starting over.

use std::fmt;
use std::str::FromStr;

use adreel_proto::{
    AdCopy, CampaignError, CampaignRequest, DeliveryReceipt, FailureKind, UserPreferences,
    VideoArtifact,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a campaign job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    PreferencesFetched,
    CopyGenerated,
    VideoRendered,
    Sent,
    Failed,
}

impl JobStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::PreferencesFetched,
        JobStatus::CopyGenerated,
        JobStatus::VideoRendered,
        JobStatus::Sent,
        JobStatus::Failed,
    ];

    /// The status a successful stage moves to, or `None` for terminal statuses.
    pub fn next(self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::PreferencesFetched),
            JobStatus::PreferencesFetched => Some(JobStatus::CopyGenerated),
            JobStatus::CopyGenerated => Some(JobStatus::VideoRendered),
            JobStatus::VideoRendered => Some(JobStatus::Sent),
            JobStatus::Sent | JobStatus::Failed => None,
        }
    }

    /// `sent` and `failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Sent | JobStatus::Failed)
    }

    /// Position in the lifecycle. `failed` ranks after every other status.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::PreferencesFetched => 1,
            JobStatus::CopyGenerated => 2,
            JobStatus::VideoRendered => 3,
            JobStatus::Sent => 4,
            JobStatus::Failed => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::PreferencesFetched => "preferences_fetched",
            JobStatus::CopyGenerated => "copy_generated",
            JobStatus::VideoRendered => "video_rendered",
            JobStatus::Sent => "sent",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// Returned when a string names no [`JobStatus`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct ParseStatusError(String);

/// One recorded status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
}

/// Why a job failed, and how far it got first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
    /// Last status the job held before failing.
    pub stage_reached: JobStatus,
    pub at: DateTime<Utc>,
}

/// Where the preferences used for a job came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PreferenceSource {
    /// The store returned a record for the user.
    Stored,
    /// The store has no record; empty preferences were used.
    NotFound,
    /// The store could not be read; empty preferences were used.
    Unavailable { reason: String },
}

/// Errors raised when a job is asked to move somewhere it cannot go.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Only failed jobs can be reopened.
    #[error("job {job_id} is {status}, only failed jobs can be reopened")]
    NotFailed { job_id: String, status: JobStatus },

    /// The failure cannot be fixed by trying again.
    #[error("job {job_id} cannot be resumed: {reason}")]
    NotResumable { job_id: String, reason: String },
}

/// Generates an identifier of the form `job-YYYYMMDD-HHMMSS-<uuid>`.
///
/// The timestamp keeps ids sortable by eye; the random v4 suffix keeps them
/// unique across processes sharing one journal.
pub fn generate_job_id() -> String {
    let now = Utc::now();
    format!("job-{}-{}", now.format("%Y%m%d-%H%M%S"), Uuid::new_v4().simple())
}

/// One end-to-end execution of the pipeline for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignJob {
    job_id: String,
    attempt: u32,
    request: CampaignRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferences: Option<UserPreferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preference_source: Option<PreferenceSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    copy: Option<AdCopy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact: Option<VideoArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    receipt: Option<DeliveryReceipt>,
    status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<FailureRecord>,
    #[serde(default)]
    history: Vec<StageTransition>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CampaignJob {
    /// Creates a pending job with a fresh identifier.
    pub fn new(request: CampaignRequest) -> Self {
        Self::with_id(generate_job_id(), request)
    }

    /// Creates a pending job with the given identifier.
    pub fn with_id(job_id: impl Into<String>, request: CampaignRequest) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            attempt: 1,
            request,
            preferences: None,
            preference_source: None,
            copy: None,
            artifact: None,
            receipt: None,
            status: JobStatus::Pending,
            failure: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Attempt number, starting at 1 and incremented by [`CampaignJob::reopen`].
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn request(&self) -> &CampaignRequest {
        &self.request
    }

    pub fn preferences(&self) -> Option<&UserPreferences> {
        self.preferences.as_ref()
    }

    pub fn preference_source(&self) -> Option<&PreferenceSource> {
        self.preference_source.as_ref()
    }

    pub fn copy(&self) -> Option<&AdCopy> {
        self.copy.as_ref()
    }

    pub fn artifact(&self) -> Option<&VideoArtifact> {
        self.artifact.as_ref()
    }

    pub fn receipt(&self) -> Option<&DeliveryReceipt> {
        self.receipt.as_ref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    /// Transitions made during the current attempt, oldest first.
    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The furthest successful status: the current status, or for a failed
    /// job the status it held when it failed.
    pub fn stage_reached(&self) -> JobStatus {
        match (&self.failure, self.status) {
            (Some(failure), JobStatus::Failed) => failure.stage_reached,
            _ => self.status,
        }
    }

    /// True when every recorded transition moved forward by exactly one stage
    /// or into `failed`.
    pub fn is_monotonic(&self) -> bool {
        self.history.iter().all(|t| {
            t.to.rank() > t.from.rank() && (t.to == JobStatus::Failed || t.from.next() == Some(t.to))
        }) && self
            .history
            .windows(2)
            .all(|pair| pair[0].to == pair[1].from)
    }

    /// Whether [`CampaignJob::reopen`] or an orchestrator resume can make progress.
    pub fn is_resumable(&self) -> bool {
        match self.status {
            JobStatus::Sent => false,
            JobStatus::Failed => self
                .failure
                .as_ref()
                .is_none_or(|f| f.kind != FailureKind::InvalidRequest),
            _ => true,
        }
    }

    /// Starts a new attempt of a failed job at the stage it had reached.
    ///
    /// The failed snapshot is left untouched; the returned job carries the
    /// same identifier, every stage output produced so far, an incremented
    /// attempt number, and an empty history.
    pub fn reopen(&self) -> Result<CampaignJob, TransitionError> {
        let Some(failure) = self.failure.as_ref().filter(|_| self.status == JobStatus::Failed)
        else {
            return Err(TransitionError::NotFailed {
                job_id: self.job_id.clone(),
                status: self.status,
            });
        };

        if failure.kind == FailureKind::InvalidRequest {
            return Err(TransitionError::NotResumable {
                job_id: self.job_id.clone(),
                reason: failure.message.clone(),
            });
        }

        let mut next = self.clone();
        next.attempt += 1;
        next.status = failure.stage_reached;
        next.failure = None;
        next.history.clear();
        next.updated_at = Utc::now();
        Ok(next)
    }

    pub(crate) fn record_preferences(
        &mut self,
        preferences: UserPreferences,
        source: PreferenceSource,
    ) {
        self.preferences = Some(preferences);
        self.preference_source = Some(source);
        self.transition(JobStatus::PreferencesFetched);
    }

    pub(crate) fn record_copy(&mut self, copy: AdCopy) {
        self.copy = Some(copy);
        self.transition(JobStatus::CopyGenerated);
    }

    pub(crate) fn record_artifact(&mut self, artifact: VideoArtifact) {
        self.artifact = Some(artifact);
        self.transition(JobStatus::VideoRendered);
    }

    pub(crate) fn record_delivery(&mut self, receipt: DeliveryReceipt) {
        self.receipt = Some(receipt);
        self.transition(JobStatus::Sent);
    }

    /// Freezes the job at `failed`, keeping every output produced so far.
    pub(crate) fn mark_failed(&mut self, error: &CampaignError) {
        if self.status.is_terminal() {
            return;
        }
        self.failure = Some(FailureRecord {
            kind: error.kind(),
            message: error.to_string(),
            stage_reached: self.status,
            at: Utc::now(),
        });
        self.transition(JobStatus::Failed);
    }

    fn transition(&mut self, to: JobStatus) {
        debug_assert!(
            to == JobStatus::Failed || self.status.next() == Some(to),
            "illegal transition {} -> {}",
            self.status,
            to
        );
        let at = Utc::now();
        self.history.push(StageTransition {
            from: self.status,
            to,
            at,
        });
        self.status = to;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CampaignRequest {
        CampaignRequest {
            user_id: "u1".to_string(),
            product_name: "SkiJacket".to_string(),
            audience: "winter athletes".to_string(),
            goal: Some("sales".to_string()),
            recipient_email: "a@b.com".to_string(),
        }
    }

    fn rendered_job() -> CampaignJob {
        let mut job = CampaignJob::with_id("job-test", request());
        job.record_preferences(UserPreferences::empty("u1"), PreferenceSource::NotFound);
        job.record_copy(AdCopy::new("Stay warm, ski hard."));
        job.record_artifact(VideoArtifact {
            url: "https://cdn/x.mp4".to_string(),
            duration_seconds: Some(15.0),
        });
        job
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = CampaignJob::new(request());
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.attempt(), 1);
        assert!(job.job_id().starts_with("job-"));
        assert!(job.history().is_empty());
        assert!(job.is_resumable());
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: std::collections::HashSet<_> = (0..10_000).map(|_| generate_job_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_generated_id_format() {
        let id = generate_job_id();
        let parts: Vec<&str> = id.split('-').collect();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "job");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 32);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_full_lifecycle_is_monotonic() {
        let mut job = rendered_job();
        job.record_delivery(DeliveryReceipt {
            accepted: true,
            message_id: Some("msg-1".to_string()),
            sent_at: Utc::now(),
        });

        assert_eq!(job.status(), JobStatus::Sent);
        assert_eq!(job.history().len(), 4);
        assert!(job.is_monotonic());
        assert!(job.is_terminal());
        assert!(!job.is_resumable());
    }

    #[test]
    fn test_failure_keeps_partial_outputs() {
        let mut job = rendered_job();
        job.mark_failed(&CampaignError::DeliveryFailed("smtp said no".to_string()));

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.stage_reached(), JobStatus::VideoRendered);
        assert!(job.copy().is_some());
        assert!(job.artifact().is_some());

        let failure = job.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::DeliveryFailed);
        assert!(failure.message.contains("smtp said no"));
        assert!(job.is_monotonic());
    }

    #[test]
    fn test_mark_failed_on_terminal_job_is_ignored() {
        let mut job = rendered_job();
        job.mark_failed(&CampaignError::Cancelled);
        let snapshot = job.clone();

        job.mark_failed(&CampaignError::DeliveryFailed("again".to_string()));
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_reopen_continues_from_stage_reached() {
        let mut job = rendered_job();
        job.mark_failed(&CampaignError::DeliveryFailed("bounce".to_string()));

        let reopened = job.reopen().unwrap();
        assert_eq!(reopened.job_id(), job.job_id());
        assert_eq!(reopened.attempt(), 2);
        assert_eq!(reopened.status(), JobStatus::VideoRendered);
        assert!(reopened.failure().is_none());
        assert!(reopened.history().is_empty());
        assert_eq!(reopened.copy(), job.copy());
        assert_eq!(reopened.artifact(), job.artifact());

        // The failed snapshot itself never moves.
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn test_reopen_requires_failed_status() {
        let job = rendered_job();
        assert!(matches!(
            job.reopen(),
            Err(TransitionError::NotFailed {
                status: JobStatus::VideoRendered,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_request_is_not_resumable() {
        let mut job = CampaignJob::new(request());
        job.mark_failed(&CampaignError::InvalidRequest("audience is empty".to_string()));

        assert!(!job.is_resumable());
        assert!(matches!(
            job.reopen(),
            Err(TransitionError::NotResumable { .. })
        ));
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_ranks_follow_lifecycle() {
        let mut status = JobStatus::Pending;
        while let Some(next) = status.next() {
            assert!(next.rank() > status.rank());
            status = next;
        }
        assert_eq!(status, JobStatus::Sent);
        assert!(JobStatus::Failed.rank() > JobStatus::Sent.rank());
    }

    #[test]
    fn test_job_serialization_preserves_state() {
        let mut job = rendered_job();
        job.mark_failed(&CampaignError::RenderTimeout { waited_secs: 30 });

        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        let parsed: CampaignJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, job);
    }
}
