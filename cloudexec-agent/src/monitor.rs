use crate::workload::{self, WorkDirs};
use anyhow::Result;
use cloudexec_common::naming::output_prefix;
use cloudexec_common::JobStatus;
use cloudexec_storage::{upload_tree, ObjectStore, StateStore};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// How the run ended. A timeout is deliberately distinct from a failure so
/// operators can tell "ran out of time" apart from "the workload failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    TimedOut,
}

/// Cadences for the completion race. Production uses the defaults; tests
/// shrink them.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl MonitorConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

/// Resolve one poll tick. The exit code wins over the timeout when both are
/// observable in the same tick.
pub fn decide(exit_code: Option<i32>, timed_out: bool) -> Option<Outcome> {
    match exit_code {
        Some(0) => Some(Outcome::Completed),
        Some(_) => Some(Outcome::Failed),
        None if timed_out => Some(Outcome::TimedOut),
        None => None,
    }
}

/// Poll the running job until it finishes or times out, uploading produced
/// output at the heartbeat cadence along the way. Publishes the terminal
/// status before returning; `completed_at` is stamped only for the
/// exit-code-driven outcomes, never for a timeout.
pub async fn watch_job(
    store: &dyn ObjectStore,
    job_id: i64,
    config: &MonitorConfig,
    dirs: &WorkDirs,
) -> Result<Outcome> {
    // The deadline is computed once, at job start, from the caller-supplied
    // duration; there is no renegotiation.
    let started = Instant::now();
    let mut last_heartbeat = Instant::now();

    loop {
        sleep(config.poll_interval).await;

        let exit_code = workload::read_exit_code(dirs);
        let timed_out = started.elapsed() >= config.timeout;

        if let Some(outcome) = decide(exit_code, timed_out) {
            let state = StateStore::new(store);
            match outcome {
                Outcome::Completed => {
                    info!("job {} completed (exit code 0)", job_id);
                    state.update_status(job_id, JobStatus::Completed, true).await?;
                }
                Outcome::Failed => {
                    info!("job {} failed (exit code {:?})", job_id, exit_code);
                    state.update_status(job_id, JobStatus::Failed, true).await?;
                }
                Outcome::TimedOut => {
                    info!("job {} hit its {}s timeout", job_id, config.timeout.as_secs());
                    state
                        .update_status(job_id, JobStatus::Timedout, false)
                        .await?;
                }
            }
            return Ok(outcome);
        }

        if last_heartbeat.elapsed() >= config.heartbeat_interval {
            if let Err(e) = upload_output(store, job_id, dirs).await {
                warn!("incremental output upload failed: {:#}", e);
            }
            last_heartbeat = Instant::now();
        }
    }
}

/// Copy everything the job produced to its output prefix. Fuzzing campaigns
/// keep their corpus next to the output tree; it is merged in under
/// `output/corpus`.
pub async fn upload_output(
    store: &dyn ObjectStore,
    job_id: i64,
    dirs: &WorkDirs,
) -> Result<usize> {
    let prefix = output_prefix(job_id);
    let mut uploaded = upload_tree(store, &dirs.output_dir(), &prefix).await?;

    let corpus = dirs.corpus_dir();
    if corpus.is_dir() {
        uploaded += upload_tree(store, &corpus, &format!("{}corpus/", prefix)).await?;
    }

    Ok(uploaded)
}
