use anyhow::{Context, Result};
use cloudexec_agent::cleanup::{self, CleanupContext};
use cloudexec_agent::config::AgentCredentials;
use cloudexec_agent::monitor::{self, MonitorConfig, Outcome};
use cloudexec_agent::workload::{self, JobSpec, WorkDirs};
use cloudexec_agent::{bootstrap, metadata};
use cloudexec_common::JobStatus;
use cloudexec_providers::DigitalOceanProvider;
use cloudexec_storage::{ObjectStore, SpacesStore, StateStore};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .try_init();

    info!("cloudexec agent starting");

    let http = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(5))
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap();

    let meta = metadata::fetch(&http)
        .await
        .context("failed to read instance metadata")?;

    bootstrap::prepare(&meta)
        .await
        .context("host bootstrap failed")?;

    // Not one of ours: exit before doing any billable or destructive work.
    let identity = metadata::confirm_identity(&meta)?;
    info!(
        "running job {} for {} on instance {}",
        identity.job_id, identity.owner, identity.instance_id
    );

    // Without these the agent could never self-terminate; bail while the
    // only cost so far is a few packages.
    let creds = AgentCredentials::from_env()?;

    let provider = DigitalOceanProvider::new(creds.api_key.clone());
    let store = SpacesStore::connect(
        &creds.spaces_region,
        &creds.spaces_access_key,
        &creds.spaces_secret_key,
        identity.bucket.clone(),
    )
    .await
    .context("failed to reach object storage")?;

    let spec = JobSpec::from_env()?;
    let dirs = WorkDirs::default();

    // Armed: from here on, every exit path funnels into exactly one cleanup
    // call, including termination and interrupt signals.
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let outcome: Option<Outcome> = tokio::select! {
        result = run_job(&store, identity.job_id, &spec, &dirs) => match result {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("job run failed: {:#}", e);
                None
            }
        },
        _ = sigterm.recv() => {
            warn!("termination signal received");
            None
        }
        _ = sigint.recv() => {
            warn!("interrupt signal received");
            None
        }
    };

    let ctx = CleanupContext::new(
        &provider,
        &store,
        identity.job_id,
        identity.instance_id,
        dirs,
    );
    cleanup::run(&ctx, outcome).await;

    Ok(())
}

async fn run_job(
    store: &dyn ObjectStore,
    job_id: i64,
    spec: &JobSpec,
    dirs: &WorkDirs,
) -> Result<Outcome> {
    workload::run_setup(spec, dirs).await?;
    workload::fetch_input(store, job_id, spec, dirs).await?;

    StateStore::new(store)
        .update_status(job_id, JobStatus::Running, false)
        .await
        .context("failed to publish the running status")?;

    workload::start_run(spec, dirs).await?;
    monitor::watch_job(store, job_id, &MonitorConfig::new(spec.timeout), dirs).await
}
