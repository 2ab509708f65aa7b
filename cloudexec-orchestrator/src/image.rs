use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cloudexec_common::naming::SNAPSHOT_PREFIX;
use cloudexec_common::{Image, Snapshot};
use cloudexec_providers::CloudProvider;

/// Pick the boot image for a new instance: the most recently created
/// snapshot whose name carries the `cloudexec-` prefix, falling back to a
/// stock base image so a cold account with zero snapshots can bootstrap.
///
/// Creation timestamps must parse as RFC 3339; a malformed one is a hard
/// error rather than a skip, since ordering would be ambiguous otherwise.
pub async fn select_boot_image(provider: &dyn CloudProvider) -> Result<Image> {
    let snapshots = provider.list_snapshots().await?;

    let mut latest: Option<(Snapshot, DateTime<Utc>)> = None;
    for snapshot in snapshots {
        let created = DateTime::parse_from_rfc3339(&snapshot.created_at)
            .with_context(|| {
                format!(
                    "failed to parse creation timestamp '{}' of snapshot '{}'",
                    snapshot.created_at, snapshot.name
                )
            })?
            .with_timezone(&Utc);

        if !snapshot.name.starts_with(SNAPSHOT_PREFIX) {
            continue;
        }

        match &latest {
            Some((_, newest)) if created <= *newest => {}
            _ => latest = Some((snapshot, created)),
        }
    }

    Ok(match latest {
        Some((snapshot, _)) => Image {
            id: snapshot.id,
            name: snapshot.name,
        },
        None => Image::fallback(),
    })
}
