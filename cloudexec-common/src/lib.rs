pub mod jobs;
pub mod naming;
pub mod resources;

pub use jobs::{JobRecord, JobStatus, StateDocument};
pub use resources::{Image, Instance, InstanceSize, Snapshot, SshKey};
