use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use cloudexec_common::{Instance, Snapshot, SshKey};

/// Inputs for a create request. The caller is responsible for tagging;
/// providers attach the tags verbatim.
#[derive(Debug, Clone)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image_id: String,
    pub user_data: String,
    pub ssh_key_fingerprint: String,
    pub tags: Vec<String>,
}

/// Result of a create request: the instance as first reported, plus the
/// provider's create-action URL when one was returned. The instance must be
/// re-fetched after the action completes to observe its public address.
#[derive(Debug, Clone)]
pub struct CreatedInstance {
    pub instance: Instance,
    pub create_action_url: Option<String>,
}

/// A provider action did not reach a terminal state within the bounded wait.
/// Callers can tell this apart from other provider failures via
/// `Error::downcast_ref`.
#[derive(Debug)]
pub struct ProvisioningTimedOut {
    pub action_url: String,
    pub waited: Duration,
}

impl fmt::Display for ProvisioningTimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "provisioning timed out after {:?} waiting on {}",
            self.waited, self.action_url
        )
    }
}

impl std::error::Error for ProvisioningTimedOut {}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Verify the credentials by fetching the account identity.
    async fn check_auth(&self) -> Result<String>;

    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<CreatedInstance>;

    /// Poll a provider action until it completes, bounded by `timeout`.
    /// A stuck action fails with `ProvisioningTimedOut`; a provider-reported
    /// failure is an error as well, never an infinite wait.
    async fn wait_for_action(&self, action_url: &str, timeout: Duration) -> Result<()>;

    async fn get_instance(&self, id: u64) -> Result<Instance>;

    /// All instances carrying `tag`, following pagination to the last page.
    async fn list_instances_by_tag(&self, tag: &str) -> Result<Vec<Instance>>;

    async fn delete_instance(&self, id: u64) -> Result<()>;

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>>;

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>>;

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey>;
}

pub mod digitalocean;
pub mod mock;

pub use digitalocean::DigitalOceanProvider;
pub use mock::MockProvider;
