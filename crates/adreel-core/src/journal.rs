//! Durable journal of campaign job snapshots.
//!
//! Every time the orchestrator records a job, the full snapshot is appended
//! as one JSON line to `.adreel/jobs.jsonl`. The latest line for a job id is
//! its current state, which is what `resume` and `deliver` load from.
//!
//! Appends take an exclusive `flock()` and reads a shared one, so several
//! `adreel` processes can share one workspace. As a [`JobSink`] the journal
//! does its file work on tokio's blocking pool, so a held lock or a slow
//! `fsync` stalls only the job being recorded.
//!
//! ```no_run
//! use adreel_core::journal::{JobJournal, JournalError};
//!
//! fn main() -> Result<(), JournalError> {
//!     let journal = JobJournal::new(".");
//!     for job in journal.list()? {
//!         println!("{} {}", job.job_id(), job.status());
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::job::{CampaignJob, JobStatus};
use crate::orchestrator::JobSink;

/// One line of the journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    /// When the snapshot was written.
    pub ts: DateTime<Utc>,
    pub job: CampaignJob,
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse job journal at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Failed to encode job snapshot: {0}")]
    Encode(String),

    #[error("Job not found in journal: {0}")]
    NotFound(String),

    #[error("File locking not supported on this platform")]
    UnsupportedPlatform,

    #[error("Journal task failed: {0}")]
    Task(String),
}

/// Append-only JSONL store of job snapshots.
#[derive(Debug, Clone)]
pub struct JobJournal {
    path: PathBuf,
}

impl JobJournal {
    /// Location of the journal relative to the workspace root.
    pub const JOURNAL_FILE: &'static str = ".adreel/jobs.jsonl";

    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            path: workspace_root.as_ref().join(Self::JOURNAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a snapshot of `job`.
    pub fn append(&self, job: &CampaignJob) -> Result<(), JournalError> {
        let line = encode(job)?;
        self.with_exclusive_lock(|mut file| write_line(&mut file, &line))
    }

    /// Appends `next` only if the latest snapshot of its job is still
    /// `loaded`, checked and written under one exclusive lock.
    ///
    /// Returns the latest snapshot instead when it differs. A job with no
    /// snapshot yet is always appended.
    pub fn append_if_latest(
        &self,
        loaded: &CampaignJob,
        next: &CampaignJob,
    ) -> Result<Option<CampaignJob>, JournalError> {
        let line = encode(next)?;

        self.with_exclusive_lock(|mut file| {
            file.seek(SeekFrom::Start(0))?;
            let latest = parse_entries(BufReader::new(&file))?
                .into_iter()
                .rev()
                .find(|entry| entry.job.job_id() == next.job_id())
                .map(|entry| entry.job);

            match latest {
                Some(latest) if !is_same_snapshot(&latest, loaded) => Ok(Some(latest)),
                _ => {
                    write_line(&mut file, &line)?;
                    Ok(None)
                }
            }
        })
    }

    /// Latest snapshot of `job_id`, if it was ever recorded.
    pub fn latest(&self, job_id: &str) -> Result<Option<CampaignJob>, JournalError> {
        let entries = self.read_all()?;
        Ok(entries
            .into_iter()
            .rev()
            .find(|entry| entry.job.job_id() == job_id)
            .map(|entry| entry.job))
    }

    /// Like [`latest`](Self::latest), but a missing job is an error.
    pub fn get(&self, job_id: &str) -> Result<CampaignJob, JournalError> {
        self.latest(job_id)?
            .ok_or_else(|| JournalError::NotFound(job_id.to_string()))
    }

    /// Latest snapshot of every job, oldest job first.
    pub fn list(&self) -> Result<Vec<CampaignJob>, JournalError> {
        let mut latest: HashMap<String, CampaignJob> = HashMap::new();
        for entry in self.read_all()? {
            latest.insert(entry.job.job_id().to_string(), entry.job);
        }

        let mut jobs: Vec<_> = latest.into_values().collect();
        jobs.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.job_id().cmp(b.job_id()))
        });
        Ok(jobs)
    }

    pub fn list_by_status(&self, status: JobStatus) -> Result<Vec<CampaignJob>, JournalError> {
        let jobs = self.list()?;
        Ok(jobs.into_iter().filter(|j| j.status() == status).collect())
    }

    /// Every snapshot recorded for `job_id`, in write order.
    pub fn snapshots(&self, job_id: &str) -> Result<Vec<JournalEntry>, JournalError> {
        let entries = self.read_all()?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.job.job_id() == job_id)
            .collect())
    }

    fn read_all(&self) -> Result<Vec<JournalEntry>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        self.with_shared_lock(|file| parse_entries(BufReader::new(file)))
    }

    /// Runs `f` on a clone of this journal on the blocking pool.
    async fn on_blocking_pool<T, F>(&self, f: F) -> Result<T, JournalError>
    where
        T: Send + 'static,
        F: FnOnce(&JobJournal) -> Result<T, JournalError> + Send + 'static,
    {
        let journal = self.clone();
        tokio::task::spawn_blocking(move || f(&journal))
            .await
            .map_err(|err| JournalError::Task(err.to_string()))?
    }

    #[cfg(unix)]
    fn with_shared_lock<T, F>(&self, f: F) -> Result<T, JournalError>
    where
        F: FnOnce(&File) -> Result<T, JournalError>,
    {
        use nix::fcntl::{Flock, FlockArg};
        use std::os::fd::AsFd;

        let file = File::open(&self.path)?;
        let lock = Flock::lock(file, FlockArg::LockShared)
            .map_err(|(_, errno)| JournalError::Io(io::Error::other(format!("flock failed: {errno}"))))?;

        let file: File = lock.as_fd().try_clone_to_owned()?.into();
        f(&file)
    }

    #[cfg(not(unix))]
    fn with_shared_lock<T, F>(&self, _f: F) -> Result<T, JournalError>
    where
        F: FnOnce(&File) -> Result<T, JournalError>,
    {
        Err(JournalError::UnsupportedPlatform)
    }

    #[cfg(unix)]
    fn with_exclusive_lock<T, F>(&self, f: F) -> Result<T, JournalError>
    where
        F: FnOnce(File) -> Result<T, JournalError>,
    {
        use nix::fcntl::{Flock, FlockArg};
        use std::os::fd::AsFd;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        let lock = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| JournalError::Io(io::Error::other(format!("flock failed: {errno}"))))?;

        let file: File = lock.as_fd().try_clone_to_owned()?.into();
        f(file)
    }

    #[cfg(not(unix))]
    fn with_exclusive_lock<T, F>(&self, _f: F) -> Result<T, JournalError>
    where
        F: FnOnce(File) -> Result<T, JournalError>,
    {
        Err(JournalError::UnsupportedPlatform)
    }
}

fn encode(job: &CampaignJob) -> Result<String, JournalError> {
    let entry = JournalEntry {
        ts: Utc::now(),
        job: job.clone(),
    };
    serde_json::to_string(&entry).map_err(|e| JournalError::Encode(e.to_string()))
}

fn write_line(file: &mut File, line: &str) -> Result<(), JournalError> {
    file.seek(SeekFrom::End(0))?;
    writeln!(file, "{line}")?;
    file.sync_all()?;
    Ok(())
}

fn parse_entries(reader: impl BufRead) -> Result<Vec<JournalEntry>, JournalError> {
    let mut entries = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let entry: JournalEntry =
            serde_json::from_str(&line).map_err(|e| JournalError::ParseError {
                line: index + 1,
                message: e.to_string(),
            })?;
        entries.push(entry);
    }

    Ok(entries)
}

fn is_same_snapshot(a: &CampaignJob, b: &CampaignJob) -> bool {
    a.job_id() == b.job_id()
        && a.attempt() == b.attempt()
        && a.status() == b.status()
        && a.updated_at() == b.updated_at()
}

#[async_trait]
impl JobSink for JobJournal {
    async fn record(&self, job: &CampaignJob) {
        let snapshot = job.clone();
        if let Err(err) = self
            .on_blocking_pool(move |journal| journal.append(&snapshot))
            .await
        {
            warn!(job_id = %job.job_id(), error = %err, "Failed to journal job snapshot");
        }
    }

    async fn claim(&self, loaded: &CampaignJob, next: &CampaignJob) -> Option<CampaignJob> {
        let (loaded_owned, next_owned) = (loaded.clone(), next.clone());
        match self
            .on_blocking_pool(move |journal| journal.append_if_latest(&loaded_owned, &next_owned))
            .await
        {
            Ok(current) => current,
            Err(err) => {
                warn!(job_id = %next.job_id(), error = %err, "Failed to journal job snapshot");
                None
            }
        }
    }
}
