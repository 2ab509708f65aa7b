use crate::monitor::{self, Outcome};
use crate::workload::WorkDirs;
use anyhow::Result;
use cloudexec_common::naming::log_key;
use cloudexec_common::JobStatus;
use cloudexec_providers::CloudProvider;
use cloudexec_storage::{ObjectStore, StateStore};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Everything cleanup needs, gathered before the job starts so the handler
/// can run no matter which path reached it.
pub struct CleanupContext<'a> {
    pub provider: &'a dyn CloudProvider,
    pub store: &'a dyn ObjectStore,
    pub job_id: i64,
    pub instance_id: u64,
    pub dirs: WorkDirs,
    /// The platform's own boot/setup log, uploaded for postmortems.
    pub boot_log: PathBuf,
}

impl<'a> CleanupContext<'a> {
    pub fn new(
        provider: &'a dyn CloudProvider,
        store: &'a dyn ObjectStore,
        job_id: i64,
        instance_id: u64,
        dirs: WorkDirs,
    ) -> Self {
        Self {
            provider,
            store,
            job_id,
            instance_id,
            dirs,
            boot_log: PathBuf::from("/var/log/cloud-init-output.log"),
        }
    }
}

/// Final teardown. Runs exactly once per agent process, whichever arm of
/// the completion race fired or however the run fell over. Every step is
/// best-effort except the intent: the self-delete at the end always gets
/// attempted.
pub async fn run(ctx: &CleanupContext<'_>, outcome: Option<Outcome>) {
    // If neither completed nor timedout was reached, the record says failed.
    // This is not an exit-code-driven transition, so completed_at stays
    // unset.
    if outcome.is_none() {
        info!("job {} reached cleanup without a terminal status", ctx.job_id);
        if let Err(e) = StateStore::new(ctx.store)
            .update_status(ctx.job_id, JobStatus::Failed, false)
            .await
        {
            warn!("could not publish the failed status: {:#}", e);
        }
    }

    match monitor::upload_output(ctx.store, ctx.job_id, &ctx.dirs).await {
        Ok(count) => info!("final output upload: {} file(s)", count),
        Err(e) => warn!("final output upload failed: {:#}", e),
    }

    dump_job_log(ctx);

    if let Err(e) = upload_boot_log(ctx).await {
        warn!("boot log upload failed: {:#}", e);
    }

    // Terminal action. Its own failure has no recovery point: log it and
    // exit, leaving the instance for manual removal.
    info!("deleting instance {}", ctx.instance_id);
    if let Err(e) = ctx.provider.delete_instance(ctx.instance_id).await {
        error!(
            "failed to delete instance {}: {:#}; remove it manually to stop billing",
            ctx.instance_id, e
        );
    }
}

/// Echo the captured job output to the console so it survives in the
/// platform's boot log even if the upload path is broken.
fn dump_job_log(ctx: &CleanupContext<'_>) {
    if let Ok(contents) = fs::read_to_string(ctx.dirs.log_file()) {
        if !contents.is_empty() {
            println!("----- job output -----");
            println!("{}", contents);
            println!("----- end job output -----");
        }
    }
}

async fn upload_boot_log(ctx: &CleanupContext<'_>) -> Result<()> {
    let contents = match fs::read(&ctx.boot_log) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => return Ok(()),
    };
    ctx.store.put(&log_key(ctx.job_id), contents).await
}
