use crate::config::Config;
use crate::user_data::{self, UserDataParams};
use crate::{image, keys};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use cloudexec_common::naming::{instance_name, job_tag, key_name, owner_tag, PURPOSE_TAG};
use cloudexec_common::{Instance, JobRecord};
use cloudexec_providers::{CloudProvider, CreateInstanceRequest};
use cloudexec_storage::{ObjectStore, StateStore};
use std::time::Duration;
use tracing::info;

/// Upper bound on waiting for the provider to report a new instance active.
/// A create that is still pending past this point surfaces as a
/// provisioning-timed-out error instead of hanging forever.
const PROVISION_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything a launch needs beyond the operator's credentials.
#[derive(Debug, Clone)]
pub struct JobParams {
    pub job_id: i64,
    pub region: String,
    pub size: String,
    pub setup_commands: String,
    pub run_command: String,
    pub timeout_seconds: u64,
    pub input_dir: String,
    pub public_key: String,
}

/// Create one tagged instance for a job and block until it is reachable.
///
/// Resolves the boot image and the SSH credential first, then issues the
/// create, waits (bounded) for the provider's create action, and re-fetches
/// the instance to observe its assigned public address. A failed create is
/// never retried here; the caller must re-invoke.
pub async fn launch(
    provider: &dyn CloudProvider,
    cfg: &Config,
    job_id: i64,
    region: &str,
    size: &str,
    user_data: &str,
    public_key: &str,
) -> Result<Instance> {
    let image = image::select_boot_image(provider)
        .await
        .context("failed to select a boot image")?;
    info!("booting from image {} ({})", image.id, image.name);

    let fingerprint = keys::ensure_key(provider, &key_name(&cfg.username), public_key).await?;

    let request = CreateInstanceRequest {
        name: instance_name(&cfg.username, job_id),
        region: region.to_string(),
        size: size.to_string(),
        image_id: image.id,
        user_data: user_data.to_string(),
        ssh_key_fingerprint: fingerprint,
        tags: vec![
            PURPOSE_TAG.to_string(),
            owner_tag(&cfg.username),
            job_tag(job_id),
        ],
    };

    let created = provider
        .create_instance(&request)
        .await
        .context("failed to create instance")?;
    info!("instance {} accepted by the provider", created.instance.id);

    if let Some(action_url) = &created.create_action_url {
        provider
            .wait_for_action(action_url, PROVISION_TIMEOUT)
            .await?;
    }

    // Re-fetch: the create response predates address assignment.
    let instance = provider.get_instance(created.instance.id).await?;
    if instance.ip.is_none() {
        return Err(anyhow!(
            "instance {} never exposed a routable public address",
            instance.id
        ));
    }

    info!(
        "instance {} active at {} ({} vCPU, {} MB, ${}/h)",
        instance.id,
        instance.ip.as_deref().unwrap_or(""),
        instance.size.vcpus,
        instance.size.memory_mb,
        instance.size.price_hourly
    );
    Ok(instance)
}

/// Root launch flow: render the boot script, provision the instance, and
/// seed the job's record into the shared state document. The agent on the
/// instance drives every transition after this.
pub async fn launch_job(
    provider: &dyn CloudProvider,
    store: &dyn ObjectStore,
    cfg: &Config,
    params: &JobParams,
) -> Result<Instance> {
    let user_data = user_data::render(&UserDataParams {
        api_token: &cfg.api_key,
        spaces_access_key: &cfg.spaces_access_key,
        spaces_secret_key: &cfg.spaces_secret_key,
        spaces_region: &cfg.spaces_region,
        setup_commands: &params.setup_commands,
        run_command: &params.run_command,
        timeout_seconds: params.timeout_seconds,
        input_dir: &params.input_dir,
    });

    let instance = launch(
        provider,
        cfg,
        params.job_id,
        &params.region,
        &params.size,
        &user_data,
        &params.public_key,
    )
    .await?;

    StateStore::new(store)
        .append_job(JobRecord::new(params.job_id, Utc::now().timestamp()))
        .await
        .context("failed to seed the job record")?;

    Ok(instance)
}
