//! Registry of active transfer jobs
//!
//! The registry is the only state shared between the caller and the job
//! workers. Jobs are stored in a concurrent `DashMap` keyed by job id; every
//! operation is O(1) and takes a single shard lock.

use crate::error::{Result, TransferError};
use crate::job::{Job, JobId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Concurrency-safe map from job id to job handle
#[derive(Debug, Default)]
pub struct JobRegistry {
    /// Active jobs (job_id -> job)
    jobs: DashMap<JobId, Arc<Job>>,
}

impl JobRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job under `id`
    ///
    /// # Errors
    ///
    /// Returns `TransferError::DuplicateJob` if `id` is already active.
    pub fn register(&self, id: JobId, job: Arc<Job>) -> Result<()> {
        match self.jobs.entry(id) {
            Entry::Occupied(_) => Err(TransferError::DuplicateJob(id)),
            Entry::Vacant(slot) => {
                slot.insert(job);
                tracing::debug!("Registered job {}", id);
                Ok(())
            }
        }
    }

    /// Look up an active job
    ///
    /// # Errors
    ///
    /// Returns `TransferError::JobNotFound` if no job is registered under `id`.
    pub fn lookup(&self, id: JobId) -> Result<Arc<Job>> {
        self.jobs
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TransferError::JobNotFound(id))
    }

    /// Remove a job; removing an unknown id is a no-op
    pub fn remove(&self, id: JobId) -> Option<Arc<Job>> {
        let removed = self.jobs.remove(&id).map(|(_, job)| job);
        if removed.is_some() {
            tracing::debug!("Removed job {}", id);
        }
        removed
    }

    /// Set the cancellation flag of a pending or running job
    ///
    /// Returns true if the flag was newly set. Unknown or terminal jobs are
    /// ignored, since a stop may race with natural completion.
    pub fn cancel(&self, id: JobId) -> bool {
        let Some(job) = self.jobs.get(&id).map(|entry| Arc::clone(entry.value())) else {
            tracing::trace!("Cancel for unknown job {} ignored", id);
            return false;
        };
        let flagged = job.request_cancel();
        if flagged {
            tracing::debug!("Cancellation requested for job {} ({})", id, job.state());
        }
        flagged
    }

    /// List all active job ids
    #[must_use]
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.jobs.iter().map(|entry| *entry.key()).collect()
    }

    /// Check whether `id` is active
    #[must_use]
    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    /// Number of active jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Check if no job is active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
