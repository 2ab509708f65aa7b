use crate::store::ObjectStore;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use cloudexec_common::naming::STATE_KEY;
use cloudexec_common::{JobRecord, JobStatus, StateDocument};

/// Access to the shared state document at `state/state.json`.
///
/// Every mutation is fetch whole document, locate the record by id, apply
/// the update, write the whole document back. There is no lock and no
/// concurrency token: correctness relies on a single writer per job id (the
/// operator side only appends new records at launch; only the agent for a
/// given job mutates that job's record afterwards).
pub struct StateStore<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> StateStore<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Load the document. A missing object reads as an empty document so
    /// the first launch against a fresh bucket works.
    pub async fn read(&self) -> Result<StateDocument> {
        match self.store.get(STATE_KEY).await? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).context("failed to parse state document")
            }
            None => Ok(StateDocument::default()),
        }
    }

    pub async fn write(&self, doc: &StateDocument) -> Result<()> {
        let body = serde_json::to_vec_pretty(doc).context("failed to encode state document")?;
        self.store.put(STATE_KEY, body).await
    }

    /// Append a freshly launched job's record. Ids are unique within the
    /// document; reusing one is a caller bug.
    pub async fn append_job(&self, record: JobRecord) -> Result<()> {
        let mut doc = self.read().await?;
        if doc.job(record.id).is_some() {
            return Err(anyhow!(
                "job {} already exists in the state document",
                record.id
            ));
        }
        doc.jobs.push(record);
        self.write(&doc).await
    }

    /// Transition a job's status. `completed_at` is stamped only when
    /// `mark_completed` is set, regardless of which status string is being
    /// written; a timeout transition passes false and leaves it unset.
    pub async fn update_status(
        &self,
        job_id: i64,
        status: JobStatus,
        mark_completed: bool,
    ) -> Result<()> {
        let mut doc = self.read().await?;
        let job = doc
            .job_mut(job_id)
            .ok_or_else(|| anyhow!("job {} not found in the state document", job_id))?;

        let now = Utc::now().timestamp();
        job.status = status;
        job.updated_at = now;
        if mark_completed {
            job.completed_at = Some(now);
        }

        self.write(&doc).await
    }

    pub async fn next_job_id(&self) -> Result<i64> {
        Ok(self.read().await?.next_job_id())
    }
}
