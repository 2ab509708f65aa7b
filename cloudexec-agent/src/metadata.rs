use anyhow::{anyhow, Context, Result};
use cloudexec_common::naming::{bucket_name, tag_value, PURPOSE_TAG};

const METADATA_BASE: &str = "http://169.254.169.254/metadata/v1";

/// What the instance knows about itself, read from the provider's metadata
/// endpoint (only reachable from inside the instance).
#[derive(Debug, Clone)]
pub struct InstanceMetadata {
    pub instance_id: u64,
    pub hostname: String,
    pub region: String,
    pub tags: Vec<String>,
}

/// The job identity derived from the instance's own tags.
#[derive(Debug, Clone)]
pub struct JobIdentity {
    pub instance_id: u64,
    pub job_id: i64,
    pub owner: String,
    pub bucket: String,
}

pub async fn fetch(client: &reqwest::Client) -> Result<InstanceMetadata> {
    let id_text = get_text(client, "id").await?;
    let instance_id = id_text
        .trim()
        .parse()
        .context("malformed instance id from the metadata endpoint")?;

    let hostname = get_text(client, "hostname").await?.trim().to_string();
    let region = get_text(client, "region").await?.trim().to_string();

    // Tags arrive one per line.
    let tags = get_text(client, "tags")
        .await?
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    Ok(InstanceMetadata {
        instance_id,
        hostname,
        region,
        tags,
    })
}

/// Confirm this instance is one of ours before doing any billable or
/// destructive work. An instance without the purpose tag or a job tag is
/// not a job instance and the agent must exit, not continue.
pub fn confirm_identity(meta: &InstanceMetadata) -> Result<JobIdentity> {
    if !meta.tags.iter().any(|t| t == PURPOSE_TAG) {
        return Err(anyhow!(
            "instance {} is not tagged as a job instance; exiting",
            meta.instance_id
        ));
    }

    let job_id = tag_value(&meta.tags, "job")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("instance {} carries no job tag; exiting", meta.instance_id))?
        .parse()
        .context("malformed job tag")?;

    let owner = tag_value(&meta.tags, "owner")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "instance {} carries no owner tag; cannot derive the bucket name",
                meta.instance_id
            )
        })?
        .to_string();

    let bucket = bucket_name(&owner);
    Ok(JobIdentity {
        instance_id: meta.instance_id,
        job_id,
        owner,
        bucket,
    })
}

async fn get_text(client: &reqwest::Client, path: &str) -> Result<String> {
    let url = format!("{}/{}", METADATA_BASE, path);
    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach the metadata endpoint at {}", url))?;
    if !resp.status().is_success() {
        return Err(anyhow!(
            "metadata endpoint {} answered status {}",
            url,
            resp.status().as_u16()
        ));
    }
    Ok(resp.text().await?)
}
