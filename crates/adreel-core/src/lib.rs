//! # adreel-core
//!
//! Campaign orchestration for the adreel pipeline.
//!
//! This crate provides:
//! - The campaign job state machine and its stage history
//! - The orchestrator that sequences preferences, copy, rendering, and delivery
//! - Retry and cancellation helpers shared by every stage
//! - Configuration loading from `adreel.yml`
//! - A JSONL journal of job snapshots for inspection and resume

pub mod config;
pub mod job;
pub mod journal;
mod orchestrator;
pub mod retry;
pub mod testing;

pub use config::{
    AdreelConfig, ConfigError, CopywriterConfig, DEFAULT_CONFIG_FILE, EmailConfig, JournalConfig,
    PipelineConfig, PreferenceStoreConfig, RendererConfig,
};
pub use job::{
    CampaignJob, FailureRecord, JobStatus, ParseStatusError, PreferenceSource, StageTransition,
    TransitionError, generate_job_id,
};
pub use journal::{JobJournal, JournalEntry, JournalError};
pub use orchestrator::{CampaignOrchestrator, Collaborators, JobFailure, JobOutcome, JobSink};
pub use retry::RetryPolicy;
