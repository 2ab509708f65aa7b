// Control-plane behavior against the in-memory provider and object store.

use cloudexec_common::naming::PURPOSE_TAG;
use cloudexec_common::JobStatus;
use cloudexec_orchestrator::{image, instances, keys, launch_job, Config, JobParams};
use cloudexec_providers::{
    CloudProvider, CreateInstanceRequest, MockProvider, ProvisioningTimedOut,
};
use cloudexec_storage::{MemoryStore, StateStore};

fn test_config() -> Config {
    Config {
        username: "alice".to_string(),
        api_key: "do-token".to_string(),
        spaces_access_key: "spaces-access".to_string(),
        spaces_secret_key: "spaces-secret".to_string(),
        spaces_region: "nyc3".to_string(),
    }
}

fn job_params(job_id: i64) -> JobParams {
    JobParams {
        job_id,
        region: "nyc3".to_string(),
        size: "s-2vcpu-4gb".to_string(),
        setup_commands: "pip install slither-analyzer".to_string(),
        run_command: "medusa fuzz".to_string(),
        timeout_seconds: 3600,
        input_dir: "input".to_string(),
        public_key: "ssh-ed25519 AAAA alice@laptop".to_string(),
    }
}

#[tokio::test]
async fn image_selector_prefers_latest_qualifying_snapshot() {
    let provider = MockProvider::new();
    provider
        .add_snapshot("100", "cloudexec-v1", "2023-01-01T00:00:00Z")
        .await;
    provider
        .add_snapshot("200", "cloudexec-v2", "2024-06-01T00:00:00Z")
        .await;
    provider
        .add_snapshot("300", "unrelated-v9", "2025-01-01T00:00:00Z")
        .await;

    let image = image::select_boot_image(&provider).await.unwrap();
    assert_eq!(image.id, "200");
    assert_eq!(image.name, "cloudexec-v2");
}

#[tokio::test]
async fn image_selector_falls_back_when_nothing_qualifies() {
    let provider = MockProvider::new();
    provider
        .add_snapshot("300", "unrelated-v9", "2025-01-01T00:00:00Z")
        .await;

    let image = image::select_boot_image(&provider).await.unwrap();
    assert_eq!(image.id, "ubuntu-20-04-x64");
    assert_eq!(image.name, "fallback");
}

#[tokio::test]
async fn image_selector_rejects_malformed_timestamps() {
    let provider = MockProvider::new();
    provider
        .add_snapshot("100", "cloudexec-v1", "yesterday-ish")
        .await;

    assert!(image::select_boot_image(&provider).await.is_err());
}

#[tokio::test]
async fn ensure_key_is_idempotent_for_identical_material() {
    let provider = MockProvider::new();
    let material = "ssh-ed25519 AAAA alice@laptop";

    let first = keys::ensure_key(&provider, "cloudexec-alice", material)
        .await
        .unwrap();
    let second = keys::ensure_key(&provider, "cloudexec-alice", material)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.list_ssh_keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn ensure_key_never_overwrites_divergent_material() {
    let provider = MockProvider::new();
    let original = "ssh-ed25519 AAAA alice@laptop";
    keys::ensure_key(&provider, "cloudexec-alice", original)
        .await
        .unwrap();

    let err = keys::ensure_key(&provider, "cloudexec-alice", "ssh-ed25519 BBBB alice@desktop")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("different material"));

    // The stored key is untouched.
    let stored = provider.list_ssh_keys().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].public_key, original);
}

#[tokio::test]
async fn list_requires_the_purpose_tag() {
    let provider = MockProvider::new();

    // Owner tag alone must not be enough to be visible.
    provider
        .create_instance(&CreateInstanceRequest {
            name: "impostor".to_string(),
            region: "nyc3".to_string(),
            size: "s-1vcpu-1gb".to_string(),
            image_id: "ubuntu-20-04-x64".to_string(),
            user_data: String::new(),
            ssh_key_fingerprint: "mock:fp:01".to_string(),
            tags: vec!["owner:alice".to_string()],
        })
        .await
        .unwrap();
    provider
        .create_instance(&CreateInstanceRequest {
            name: "cloudexec-alice-1".to_string(),
            region: "nyc3".to_string(),
            size: "s-1vcpu-1gb".to_string(),
            image_id: "ubuntu-20-04-x64".to_string(),
            user_data: String::new(),
            ssh_key_fingerprint: "mock:fp:01".to_string(),
            tags: vec![
                PURPOSE_TAG.to_string(),
                "owner:alice".to_string(),
                "job:1".to_string(),
            ],
        })
        .await
        .unwrap();

    let listed = instances::list_instances(&provider, "alice").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "cloudexec-alice-1");
}

#[tokio::test]
async fn list_aborts_when_a_matched_instance_has_no_address() {
    let provider = MockProvider::new();
    provider.set_assign_ip(false).await;
    provider
        .create_instance(&CreateInstanceRequest {
            name: "cloudexec-alice-1".to_string(),
            region: "nyc3".to_string(),
            size: "s-1vcpu-1gb".to_string(),
            image_id: "ubuntu-20-04-x64".to_string(),
            user_data: String::new(),
            ssh_key_fingerprint: "mock:fp:01".to_string(),
            tags: vec![PURPOSE_TAG.to_string(), "owner:alice".to_string()],
        })
        .await
        .unwrap();

    assert!(instances::list_instances(&provider, "alice").await.is_err());
}

// Launch with zero snapshots: the fallback image boots the instance and the
// job record lands in the state document in its initial status.
#[tokio::test]
async fn launch_with_no_snapshots_uses_the_fallback_image() {
    let provider = MockProvider::new();
    let store = MemoryStore::new();
    let cfg = test_config();

    let instance = launch_job(&provider, &store, &cfg, &job_params(1))
        .await
        .unwrap();

    assert_eq!(instance.name, "cloudexec-alice-1");
    assert!(instance.ip.is_some());

    let requests = provider.create_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].image_id, "ubuntu-20-04-x64");
    assert!(requests[0].tags.contains(&PURPOSE_TAG.to_string()));
    assert!(requests[0].tags.contains(&"owner:alice".to_string()));
    assert!(requests[0].tags.contains(&"job:1".to_string()));
    // The rendered boot script rides along as user data.
    assert!(requests[0].user_data.contains("CLOUDEXEC_RUN_COMMAND"));

    let doc = StateStore::new(&store).read().await.unwrap();
    let job = doc.job(1).expect("job record seeded at launch");
    assert_eq!(job.status, JobStatus::Provisioning);
    assert_eq!(job.completed_at, None);
}

#[tokio::test]
async fn launch_fails_when_the_address_never_resolves() {
    let provider = MockProvider::new();
    let store = MemoryStore::new();
    provider.set_assign_ip(false).await;

    let err = launch_job(&provider, &store, &test_config(), &job_params(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("public address"));

    // No record is seeded for a launch that never became reachable.
    let doc = StateStore::new(&store).read().await.unwrap();
    assert!(doc.jobs.is_empty());
}

#[tokio::test]
async fn launch_surfaces_a_provisioning_timeout_distinctly() {
    let provider = MockProvider::new();
    let store = MemoryStore::new();
    provider.set_stall_actions(true).await;

    let err = launch_job(&provider, &store, &test_config(), &job_params(1))
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<ProvisioningTimedOut>().is_some());
}

#[tokio::test]
async fn launching_a_second_job_appends_without_clobbering() {
    let provider = MockProvider::new();
    let store = MemoryStore::new();
    let cfg = test_config();

    launch_job(&provider, &store, &cfg, &job_params(1))
        .await
        .unwrap();
    launch_job(&provider, &store, &cfg, &job_params(2))
        .await
        .unwrap();

    let doc = StateStore::new(&store).read().await.unwrap();
    assert_eq!(doc.jobs.len(), 2);
    assert!(doc.job(1).is_some());
    assert!(doc.job(2).is_some());
}
