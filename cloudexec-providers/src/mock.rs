use crate::{CloudProvider, CreateInstanceRequest, CreatedInstance, ProvisioningTimedOut};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use cloudexec_common::{Instance, InstanceSize, Snapshot, SshKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct MockState {
    instances: HashMap<u64, Instance>,
    keys: Vec<SshKey>,
    snapshots: Vec<Snapshot>,
    create_requests: Vec<CreateInstanceRequest>,
    deleted: Vec<u64>,
    assign_ip: bool,
    stall_actions: bool,
}

/// In-memory provider used by tests. Instances, keys and snapshots live
/// behind a mutex; toggles let tests simulate an address that never resolves
/// or a create action that never completes.
pub struct MockProvider {
    state: Mutex<MockState>,
    next_id: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                assign_ip: true,
                ..Default::default()
            }),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn add_snapshot(&self, id: &str, name: &str, created_at: &str) {
        self.state.lock().await.snapshots.push(Snapshot {
            id: id.to_string(),
            name: name.to_string(),
            created_at: created_at.to_string(),
        });
    }

    /// When false, created instances never receive a public address.
    pub async fn set_assign_ip(&self, assign_ip: bool) {
        self.state.lock().await.assign_ip = assign_ip;
    }

    /// When true, `wait_for_action` reports a provisioning timeout.
    pub async fn set_stall_actions(&self, stall: bool) {
        self.state.lock().await.stall_actions = stall;
    }

    pub async fn create_requests(&self) -> Vec<CreateInstanceRequest> {
        self.state.lock().await.create_requests.clone()
    }

    pub async fn deleted_instances(&self) -> Vec<u64> {
        self.state.lock().await.deleted.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn check_auth(&self) -> Result<String> {
        Ok("mock@cloudexec.invalid".to_string())
    }

    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<CreatedInstance> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        let ip = state
            .assign_ip
            .then(|| format!("192.0.2.{}", (id % 254) + 1));
        let instance = Instance {
            id,
            name: req.name.clone(),
            ip,
            created_at: Utc::now().to_rfc3339(),
            size: InstanceSize {
                vcpus: 2,
                memory_mb: 4096,
                disk_gb: 80,
                price_hourly: 0.03571,
            },
            tags: req.tags.clone(),
        };

        state.create_requests.push(req.clone());
        state.instances.insert(id, instance.clone());

        Ok(CreatedInstance {
            instance,
            create_action_url: Some(format!("mock://actions/{}", id)),
        })
    }

    async fn wait_for_action(&self, action_url: &str, timeout: Duration) -> Result<()> {
        if self.state.lock().await.stall_actions {
            return Err(ProvisioningTimedOut {
                action_url: action_url.to_string(),
                waited: timeout,
            }
            .into());
        }
        Ok(())
    }

    async fn get_instance(&self, id: u64) -> Result<Instance> {
        self.state
            .lock()
            .await
            .instances
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("instance {} not found", id))
    }

    async fn list_instances_by_tag(&self, tag: &str) -> Result<Vec<Instance>> {
        let state = self.state.lock().await;
        let mut matched: Vec<Instance> = state
            .instances
            .values()
            .filter(|i| i.has_tag(tag))
            .cloned()
            .collect();
        matched.sort_by_key(|i| i.id);
        Ok(matched)
    }

    async fn delete_instance(&self, id: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.instances.remove(&id).is_none() {
            return Err(anyhow!("instance {} not found", id));
        }
        state.deleted.push(id);
        Ok(())
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        Ok(self.state.lock().await.snapshots.clone())
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        Ok(self.state.lock().await.keys.clone())
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        let mut state = self.state.lock().await;
        let key = SshKey {
            name: name.to_string(),
            fingerprint: format!("mock:fp:{:02}", state.keys.len() + 1),
            public_key: public_key.to_string(),
        };
        state.keys.push(key.clone());
        Ok(key)
    }
}
