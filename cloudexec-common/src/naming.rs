//! Tag and key naming conventions shared by the control plane and the agent.
//!
//! The tag triple on an instance (`purpose`, `owner`, `job`) is the only
//! discovery and authorization mechanism: an instance without the purpose
//! tag is invisible to list and delete regardless of its other tags.

/// Marker tag attached to every instance this system creates.
pub const PURPOSE_TAG: &str = "purpose:cloudexec";

/// Key of the shared state document inside the owner's bucket.
pub const STATE_KEY: &str = "state/state.json";

/// Name prefix that qualifies a snapshot as a boot image candidate.
pub const SNAPSHOT_PREFIX: &str = "cloudexec-";

pub fn owner_tag(username: &str) -> String {
    format!("owner:{}", username)
}

pub fn job_tag(job_id: i64) -> String {
    format!("job:{}", job_id)
}

/// Deterministic per-operator SSH credential name.
pub fn key_name(username: &str) -> String {
    format!("cloudexec-{}", username)
}

/// Deterministic instance name: `<key-name>-<job-id>`.
pub fn instance_name(username: &str, job_id: i64) -> String {
    format!("{}-{}", key_name(username), job_id)
}

pub fn bucket_name(owner: &str) -> String {
    format!("cloudexec-{}", owner)
}

pub fn input_key(job_id: i64) -> String {
    format!("job-{}/input.zip", job_id)
}

pub fn output_prefix(job_id: i64) -> String {
    format!("job-{}/output/", job_id)
}

pub fn log_key(job_id: i64) -> String {
    format!("job-{}/cloudexec.log", job_id)
}

/// Value of a `key:value` tag, if present.
pub fn tag_value<'a>(tags: &'a [String], key: &str) -> Option<&'a str> {
    tags.iter().find_map(|tag| {
        let (k, v) = tag.split_once(':')?;
        (k == key).then_some(v)
    })
}
