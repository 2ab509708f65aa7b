use anyhow::{anyhow, Result};
use cloudexec_common::naming::{owner_tag, PURPOSE_TAG};
use cloudexec_common::Instance;
use cloudexec_providers::CloudProvider;

/// Every instance owned by `owner` that this system created.
///
/// The owner tag narrows the provider-side query, but the purpose tag is
/// the authorization boundary: an instance without it stays invisible no
/// matter what else matches. Any matched instance without a public address
/// aborts the whole call rather than returning something unreachable.
pub async fn list_instances(
    provider: &dyn CloudProvider,
    owner: &str,
) -> Result<Vec<Instance>> {
    let tagged = provider.list_instances_by_tag(&owner_tag(owner)).await?;

    let mut instances = Vec::new();
    for instance in tagged {
        if !instance.has_tag(PURPOSE_TAG) {
            continue;
        }
        if instance.ip.is_none() {
            return Err(anyhow!(
                "instance {} has no public address; refusing to return partial results",
                instance.id
            ));
        }
        instances.push(instance);
    }

    Ok(instances)
}

/// Direct fetch by id. No tag filtering; use only for ids already known to
/// belong to this system.
pub async fn get_instance(provider: &dyn CloudProvider, id: u64) -> Result<Instance> {
    provider.get_instance(id).await
}

/// Unconditional delete by id. Tag-based authorization is the caller's job.
pub async fn delete_instance(provider: &dyn CloudProvider, id: u64) -> Result<()> {
    provider.delete_instance(id).await
}
