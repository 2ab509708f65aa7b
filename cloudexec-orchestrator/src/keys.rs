use anyhow::{anyhow, Result};
use cloudexec_providers::CloudProvider;
use tracing::info;

/// Ensure an SSH credential named `name` exists on the provider and carries
/// exactly `public_key`. Returns the credential's fingerprint.
///
/// A key that exists under the name with different material is a fatal
/// error: silently replacing it would break trust for instances already
/// bound to the old key, so the operator must remove it by hand.
pub async fn ensure_key(
    provider: &dyn CloudProvider,
    name: &str,
    public_key: &str,
) -> Result<String> {
    let keys = provider.list_ssh_keys().await?;

    if let Some(existing) = keys.iter().find(|k| k.name == name) {
        if existing.public_key != public_key {
            return Err(anyhow!(
                "SSH key '{}' already exists on the provider with different material; \
                 remove the stale key from the provider's security settings and launch again",
                name
            ));
        }
        return Ok(existing.fingerprint.clone());
    }

    info!("saving SSH public key '{}' to the provider", name);
    let key = provider.create_ssh_key(name, public_key).await?;
    info!("SSH key registered with fingerprint {}", key.fingerprint);
    Ok(key.fingerprint)
}
