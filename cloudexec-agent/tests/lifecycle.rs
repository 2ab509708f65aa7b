// End-to-end agent lifecycle against the in-memory provider and store:
// exit-code completion, timeout, and signal-style cleanup.

use cloudexec_agent::cleanup::{self, CleanupContext};
use cloudexec_agent::monitor::{self, MonitorConfig, Outcome};
use cloudexec_agent::workload::WorkDirs;
use cloudexec_common::naming::{log_key, output_prefix};
use cloudexec_common::{JobRecord, JobStatus};
use cloudexec_providers::{CloudProvider, CreateInstanceRequest, MockProvider};
use cloudexec_storage::{MemoryStore, ObjectStore, StateStore};
use std::fs;
use std::time::Duration;

fn scratch_dirs(name: &str) -> WorkDirs {
    let root = std::env::temp_dir().join(format!(
        "cloudexec-lifecycle-{}-{}",
        name,
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    WorkDirs::new(root)
}

fn fast_monitor(timeout: Duration) -> MonitorConfig {
    MonitorConfig {
        timeout,
        poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(25),
    }
}

async fn seed_running_job(store: &MemoryStore, job_id: i64) {
    let state = StateStore::new(store);
    state.append_job(JobRecord::new(job_id, 0)).await.unwrap();
    state
        .update_status(job_id, JobStatus::Running, false)
        .await
        .unwrap();
}

async fn provision_mock_instance(provider: &MockProvider) -> u64 {
    provider
        .create_instance(&CreateInstanceRequest {
            name: "cloudexec-alice-1".to_string(),
            region: "nyc3".to_string(),
            size: "s-2vcpu-4gb".to_string(),
            image_id: "ubuntu-20-04-x64".to_string(),
            user_data: String::new(),
            ssh_key_fingerprint: "mock:fp:01".to_string(),
            tags: vec![
                "purpose:cloudexec".to_string(),
                "owner:alice".to_string(),
                "job:1".to_string(),
            ],
        })
        .await
        .unwrap()
        .instance
        .id
}

// Run command exits zero within the timeout: completed, completed_at set,
// instance self-deleted.
#[tokio::test]
async fn clean_exit_completes_the_job_and_self_deletes() {
    let store = MemoryStore::new();
    let provider = MockProvider::new();
    let dirs = scratch_dirs("clean-exit");
    let instance_id = provision_mock_instance(&provider).await;
    seed_running_job(&store, 1).await;

    fs::create_dir_all(dirs.output_dir()).unwrap();
    fs::write(dirs.output_dir().join("findings.json"), b"{}").unwrap();
    fs::write(dirs.exit_code_file(), "0\n").unwrap();

    let outcome = monitor::watch_job(&store, 1, &fast_monitor(Duration::from_secs(60)), &dirs)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);

    let ctx = CleanupContext::new(&provider, &store, 1, instance_id, dirs.clone());
    cleanup::run(&ctx, Some(outcome)).await;

    let doc = StateStore::new(&store).read().await.unwrap();
    let job = doc.job(1).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());

    // Output made it to the job's prefix and the instance is gone.
    let keys = store.list(&output_prefix(1)).await.unwrap();
    assert!(keys.contains(&"job-1/output/findings.json".to_string()));
    assert_eq!(provider.deleted_instances().await, vec![instance_id]);

    fs::remove_dir_all(&dirs.root).unwrap();
}

#[tokio::test]
async fn nonzero_exit_is_failed_but_still_completion_class() {
    let store = MemoryStore::new();
    let dirs = scratch_dirs("nonzero-exit");
    seed_running_job(&store, 1).await;
    fs::write(dirs.exit_code_file(), "2\n").unwrap();

    let outcome = monitor::watch_job(&store, 1, &fast_monitor(Duration::from_secs(60)), &dirs)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Failed);

    let doc = StateStore::new(&store).read().await.unwrap();
    let job = doc.job(1).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    // Exit-code driven, so the completion stamp applies even on failure.
    assert!(job.completed_at.is_some());

    fs::remove_dir_all(&dirs.root).unwrap();
}

// Run command still executing when the timeout elapses: timedout, no
// completed_at, instance self-deleted.
#[tokio::test]
async fn timeout_is_terminal_but_not_completion() {
    let store = MemoryStore::new();
    let provider = MockProvider::new();
    let dirs = scratch_dirs("timeout");
    let instance_id = provision_mock_instance(&provider).await;
    seed_running_job(&store, 1).await;

    let outcome = monitor::watch_job(&store, 1, &fast_monitor(Duration::from_millis(30)), &dirs)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::TimedOut);

    let ctx = CleanupContext::new(&provider, &store, 1, instance_id, dirs.clone());
    cleanup::run(&ctx, Some(outcome)).await;

    let doc = StateStore::new(&store).read().await.unwrap();
    let job = doc.job(1).unwrap();
    assert_eq!(job.status, JobStatus::Timedout);
    assert_eq!(job.completed_at, None);
    assert_eq!(provider.deleted_instances().await, vec![instance_id]);

    fs::remove_dir_all(&dirs.root).unwrap();
}

// Cleanup reached without a terminal status (the signal path): failed is
// published, output is uploaded best-effort, and the instance is deleted.
#[tokio::test]
async fn interrupted_run_is_failed_with_best_effort_upload() {
    let store = MemoryStore::new();
    let provider = MockProvider::new();
    let dirs = scratch_dirs("interrupted");
    let instance_id = provision_mock_instance(&provider).await;
    seed_running_job(&store, 1).await;

    fs::create_dir_all(dirs.output_dir()).unwrap();
    fs::write(dirs.output_dir().join("partial.log"), b"so far").unwrap();

    let ctx = CleanupContext::new(&provider, &store, 1, instance_id, dirs.clone());
    cleanup::run(&ctx, None).await;

    let doc = StateStore::new(&store).read().await.unwrap();
    let job = doc.job(1).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.completed_at, None);

    let keys = store.list(&output_prefix(1)).await.unwrap();
    assert!(keys.contains(&"job-1/output/partial.log".to_string()));
    assert_eq!(provider.deleted_instances().await, vec![instance_id]);

    fs::remove_dir_all(&dirs.root).unwrap();
}

// The self-delete is attempted even when every earlier cleanup step has
// nothing to work with, and its failure does not panic the agent.
#[tokio::test]
async fn cleanup_still_deletes_when_the_job_record_is_missing() {
    let store = MemoryStore::new();
    let provider = MockProvider::new();
    let dirs = scratch_dirs("no-record");
    let instance_id = provision_mock_instance(&provider).await;

    let ctx = CleanupContext::new(&provider, &store, 1, instance_id, dirs.clone());
    cleanup::run(&ctx, None).await;

    assert_eq!(provider.deleted_instances().await, vec![instance_id]);

    fs::remove_dir_all(&dirs.root).unwrap();
}

#[tokio::test]
async fn corpus_directory_is_merged_into_the_output_tree() {
    let store = MemoryStore::new();
    let dirs = scratch_dirs("corpus");

    fs::create_dir_all(dirs.output_dir()).unwrap();
    fs::write(dirs.output_dir().join("report.txt"), b"report").unwrap();
    fs::create_dir_all(dirs.corpus_dir()).unwrap();
    fs::write(dirs.corpus_dir().join("case-1"), b"input").unwrap();

    let uploaded = monitor::upload_output(&store, 1, &dirs).await.unwrap();
    assert_eq!(uploaded, 2);

    let keys = store.list("job-1/").await.unwrap();
    assert!(keys.contains(&"job-1/output/report.txt".to_string()));
    assert!(keys.contains(&"job-1/output/corpus/case-1".to_string()));

    fs::remove_dir_all(&dirs.root).unwrap();
}

#[tokio::test]
async fn nonempty_boot_log_is_uploaded_under_the_job_prefix() {
    let store = MemoryStore::new();
    let provider = MockProvider::new();
    let dirs = scratch_dirs("boot-log");
    let instance_id = provision_mock_instance(&provider).await;
    seed_running_job(&store, 1).await;

    let boot_log = dirs.root.join("cloud-init-output.log");
    fs::write(&boot_log, b"cloud-init: done").unwrap();

    let mut ctx = CleanupContext::new(&provider, &store, 1, instance_id, dirs.clone());
    ctx.boot_log = boot_log;
    cleanup::run(&ctx, None).await;

    let uploaded = store.get(&log_key(1)).await.unwrap();
    assert_eq!(uploaded.as_deref(), Some(b"cloud-init: done".as_slice()));

    fs::remove_dir_all(&dirs.root).unwrap();
}
