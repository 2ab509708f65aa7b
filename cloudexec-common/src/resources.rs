use serde::{Deserialize, Serialize};

/// Capacity descriptor captured from the provider's create/get responses so
/// callers can display instance size and hourly cost.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct InstanceSize {
    pub vcpus: i64,
    pub memory_mb: i64,
    pub disk_gb: i64,
    pub price_hourly: f64,
}

/// A provisioned compute instance as reported by the provider.
///
/// Never cached beyond a single call: every query re-fetches truth from the
/// provider. The public address may be absent transiently right after
/// creation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Instance {
    pub id: u64,
    pub name: String,
    pub ip: Option<String>,
    pub created_at: String,
    pub size: InstanceSize,
    pub tags: Vec<String>,
}

impl Instance {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A boot snapshot owned by the provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// A boot image selected for a new instance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Image {
    pub id: String,
    pub name: String,
}

impl Image {
    /// Known-good base OS image used when no snapshot qualifies, so a cold
    /// environment with zero prior snapshots can still bootstrap.
    pub fn fallback() -> Self {
        Self {
            id: "ubuntu-20-04-x64".to_string(),
            name: "fallback".to_string(),
        }
    }
}

/// An SSH credential registered on the provider. At most one key may exist
/// under a given deterministic name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SshKey {
    pub name: String,
    pub fingerprint: String,
    pub public_key: String,
}
