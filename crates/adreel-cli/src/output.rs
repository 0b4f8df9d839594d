//! Human-readable rendering of jobs for the terminal.

use std::fmt::Write as _;

use adreel_core::{CampaignJob, JobStatus};

/// Multi-line summary of one job.
pub fn format_job(job: &CampaignJob) -> String {
    let mut out = String::new();
    let request = job.request();

    let _ = writeln!(out, "{}  {}", job.job_id(), job.status());
    let _ = writeln!(out, "  attempt:   {}", job.attempt());
    let _ = writeln!(out, "  user:      {}", request.user_id);
    let _ = writeln!(out, "  product:   {}", request.product_name);
    let _ = writeln!(out, "  recipient: {}", request.recipient_email);

    if let Some(copy) = job.copy() {
        let _ = writeln!(out, "  copy:      {}", copy.text);
    }
    if let Some(artifact) = job.artifact() {
        let _ = writeln!(out, "  video:     {}", artifact.url);
    }
    if let Some(receipt) = job.receipt() {
        let id = receipt.message_id.as_deref().unwrap_or("-");
        let _ = writeln!(out, "  message:   {id}");
    }
    if let Some(failure) = job.failure() {
        let _ = writeln!(out, "  reached:   {}", failure.stage_reached);
        let _ = writeln!(out, "  error:     {} ({})", failure.message, failure.kind);
        if job.status() == JobStatus::Failed && job.is_resumable() {
            let hint = if failure.stage_reached == JobStatus::VideoRendered {
                "deliver"
            } else {
                "resume"
            };
            let _ = writeln!(out, "  next:      adreel {hint} {}", job.job_id());
        }
    }

    out
}

/// One line per job, newest last.
pub fn format_job_list(jobs: &[CampaignJob]) -> String {
    if jobs.is_empty() {
        return "No jobs recorded.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<52} {:<20} {:<19} {:<12} PRODUCT",
        "JOB", "STATUS", "CREATED", "USER"
    );
    for job in jobs {
        let _ = writeln!(
            out,
            "{:<52} {:<20} {:<19} {:<12} {}",
            job.job_id(),
            job.status().as_str(),
            job.created_at().format("%Y-%m-%d %H:%M:%S"),
            job.request().user_id,
            job.request().product_name
        );
    }
    out
}
