use serde::{Deserialize, Serialize};

/// Lifecycle status of a job, serialized lowercase into the state document.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Set by the operator side when the job record is seeded at launch.
    Provisioning,
    Running,
    Completed,
    Failed,
    Timedout,
}

impl JobStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timedout
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Provisioning => write!(f, "provisioning"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Timedout => write!(f, "timedout"),
        }
    }
}

/// One entry in the shared state document's job array.
///
/// Timestamps are unix seconds. `completed_at` stays absent until a
/// completion-class transition; a timeout never sets it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub status: JobStatus,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl JobRecord {
    pub fn new(id: i64, now: i64) -> Self {
        Self {
            id,
            status: JobStatus::Provisioning,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// The whole persisted state: a single JSON object holding every job record.
/// Readers and writers always load and store the document as a unit.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct StateDocument {
    pub jobs: Vec<JobRecord>,
}

impl StateDocument {
    pub fn job(&self, id: i64) -> Option<&JobRecord> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_mut(&mut self, id: i64) -> Option<&mut JobRecord> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Next unused job id. Ids are assigned by the operator side and are
    /// unique within the document.
    pub fn next_job_id(&self) -> i64 {
        self.jobs.iter().map(|j| j.id).max().unwrap_or(0) + 1
    }
}
