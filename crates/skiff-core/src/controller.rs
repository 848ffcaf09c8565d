//! Job controller
//!
//! The controller is the caller-facing facade: it validates parameters,
//! registers the job, and hands it to a dedicated worker task. The caller
//! gets a [`JobCompletion`] future that resolves exactly once with the
//! job's [`TransferResult`].
//!
//! Before a completion resolves, every event of that job has been handed to
//! the event sink and the job id has been released, so the same id can be
//! submitted again from the completion handler.

use crate::config::EngineConfig;
use crate::engine::{DownloadEngine, EngineContext, UploadEngine};
use crate::error::{Result, TransferError};
use crate::events::EventSink;
use crate::job::{Direction, Job, JobId, JobRegistry, JobSnapshot, JobState};
use crate::params::{DownloadParams, TransferParams, UploadParams};
use crate::resolver::{ByteResolver, FsResolver};
use crate::result::TransferResult;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Resolves once with the outcome of a submitted job
#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited"]
pub struct JobCompletion {
    job_id: JobId,
    direction: Direction,
    rx: oneshot::Receiver<TransferResult>,
}

impl JobCompletion {
    /// Id of the job this completion belongs to
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl Future for JobCompletion {
    type Output = TransferResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let (job_id, direction) = (self.job_id, self.direction);
        Pin::new(&mut self.rx).poll(cx).map(|outcome| {
            outcome.unwrap_or_else(|_| {
                TransferResult::failed(
                    job_id,
                    direction,
                    None,
                    0,
                    TransferError::Unknown("transfer worker exited without a result".into()),
                )
            })
        })
    }
}

/// Caller-facing facade over the registry and the engines
#[derive(Debug, Clone)]
pub struct JobController {
    registry: Arc<JobRegistry>,
    downloads: DownloadEngine,
    uploads: UploadEngine,
}

impl JobController {
    /// Controller on the local filesystem with default settings
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        let ctx = EngineContext::new(Arc::new(FsResolver), events, EngineConfig::default());
        Self::from_context(ctx)
    }

    /// Controller with a custom resolver and settings
    ///
    /// # Errors
    ///
    /// Returns `TransferError::MalformedParams` if `config` is invalid.
    pub fn with_config(
        resolver: Arc<dyn ByteResolver>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_context(EngineContext::new(resolver, events, config)))
    }

    fn from_context(ctx: EngineContext) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            downloads: DownloadEngine::new(ctx.clone()),
            uploads: UploadEngine::new(ctx),
        }
    }

    /// Start a download
    ///
    /// # Errors
    ///
    /// See [`JobController::submit`].
    pub fn download(&self, params: DownloadParams) -> Result<JobCompletion> {
        self.submit(params)
    }

    /// Start an upload
    ///
    /// # Errors
    ///
    /// See [`JobController::submit`].
    pub fn upload(&self, params: UploadParams) -> Result<JobCompletion> {
        self.submit(params)
    }

    /// Validate, register and start a job
    ///
    /// Must be called from within a tokio runtime. Transfer failures are
    /// reported through the returned completion, never here.
    ///
    /// # Errors
    ///
    /// - `MalformedParams` if the parameters are invalid
    /// - `DuplicateJob` if the id is already active
    /// - `Unknown` if no tokio runtime is available
    pub fn submit(&self, params: impl Into<TransferParams>) -> Result<JobCompletion> {
        let params = params.into();
        params.validate()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransferError::Unknown("no tokio runtime to run transfers on".into()))?;

        let (id, direction) = (params.job_id(), params.direction());
        let job = Arc::new(Job::new(id, direction));
        self.registry.register(id, Arc::clone(&job))?;
        tracing::info!("Submitted {} job {}", direction, id);

        let (tx, rx) = oneshot::channel();
        let registry = Arc::clone(&self.registry);
        let downloads = self.downloads.clone();
        let uploads = self.uploads.clone();

        runtime.spawn(async move {
            let work = {
                let job = Arc::clone(&job);
                async move {
                    match params {
                        TransferParams::Download(p) => downloads.execute(job, p).await,
                        TransferParams::Upload(p) => uploads.execute(job, p).await,
                    }
                }
            };

            let result = AssertUnwindSafe(work).catch_unwind().await.unwrap_or_else(|_| {
                tracing::error!("Transfer worker for job {} panicked", id);
                job.finish(JobState::Failed);
                TransferResult::failed(
                    id,
                    direction,
                    None,
                    job.bytes_transferred(),
                    TransferError::Unknown("transfer worker panicked".into()),
                )
            });

            registry.remove(id);
            tracing::debug!("Job {} finished as {}", id, result.state);
            if tx.send(result).is_err() {
                tracing::trace!("Completion for job {} dropped by caller", id);
            }
        });

        Ok(JobCompletion {
            job_id: id,
            direction,
            rx,
        })
    }

    /// Request cancellation of a job of either direction
    ///
    /// Returns true if the request was newly recorded. Unknown and finished
    /// ids are ignored.
    pub fn stop(&self, id: JobId) -> bool {
        self.registry.cancel(id)
    }

    /// Request cancellation of a download; upload ids are ignored
    pub fn stop_download(&self, id: JobId) -> bool {
        self.stop_direction(id, Direction::Download)
    }

    /// Request cancellation of an upload; download ids are ignored
    pub fn stop_upload(&self, id: JobId) -> bool {
        self.stop_direction(id, Direction::Upload)
    }

    fn stop_direction(&self, id: JobId, direction: Direction) -> bool {
        match self.registry.lookup(id) {
            Ok(job) if job.direction() == direction => self.registry.cancel(id),
            Ok(job) => {
                tracing::debug!(
                    "Stop {} for job {} ignored, job is a {}",
                    direction,
                    id,
                    job.direction()
                );
                false
            }
            Err(_) => false,
        }
    }

    /// Ids of all jobs that have not completed yet
    #[must_use]
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids = self.registry.active_jobs();
        ids.sort_unstable();
        ids
    }

    /// Check whether `id` is active
    #[must_use]
    pub fn is_active(&self, id: JobId) -> bool {
        self.registry.contains(id)
    }

    /// Snapshot of an active job
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<JobSnapshot> {
        self.registry.lookup(id).ok().map(|job| job.snapshot())
    }

    /// Underlying registry
    #[must_use]
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }
}
