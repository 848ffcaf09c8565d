//! Download engine

use super::{EngineContext, apply_headers, collect_headers, within};
use crate::error::{Result, TransferError};
use crate::events::TransferEvent;
use crate::job::{Direction, Job};
use crate::params::DownloadParams;
use crate::progress::{ProgressState, ProgressThrottler};
use crate::resolver::BoxedWriter;
use crate::result::TransferResult;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// Streams one HTTP response body into a sink
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    ctx: EngineContext,
}

impl DownloadEngine {
    /// Create an engine
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Run `params` to completion for `job`
    ///
    /// Never fails: every outcome, including errors, is folded into the
    /// returned [`TransferResult`], and the job is left in the matching
    /// terminal state.
    pub async fn execute(&self, job: Arc<Job>, params: DownloadParams) -> TransferResult {
        job.start();
        let mut status = None;
        let result = match self.run(&job, &params, &mut status).await {
            Ok(result) => result,
            Err(err) if job.is_cancel_requested() => {
                tracing::debug!("Download {} stopped while failing: {}", job.id(), err);
                TransferResult::cancelled(
                    job.id(),
                    Direction::Download,
                    status,
                    job.bytes_transferred(),
                )
            }
            Err(err) => {
                tracing::warn!("Download {} failed: {}", job.id(), err);
                TransferResult::failed(
                    job.id(),
                    Direction::Download,
                    status,
                    job.bytes_transferred(),
                    err,
                )
            }
        };
        job.finish(result.state);
        result
    }

    async fn run(
        &self,
        job: &Job,
        params: &DownloadParams,
        status: &mut Option<u16>,
    ) -> Result<TransferResult> {
        let url = params.validate()?;
        if job.is_cancel_requested() {
            return Ok(TransferResult::cancelled(job.id(), Direction::Download, None, 0));
        }

        tracing::debug!("Download {} GET {}", job.id(), url);
        let config = &self.ctx.config;
        let read_timeout = config.read_timeout_or(params.read_timeout);
        let client = self
            .ctx
            .client(config.connect_timeout_or(params.connect_timeout))?;
        let request = apply_headers(client.get(url), &params.headers);
        let mut response = within(
            read_timeout,
            "timed out waiting for response headers",
            request.send(),
        )
        .await?;

        let status_code = response.status().as_u16();
        *status = Some(status_code);
        let content_length = response.content_length();
        let headers = collect_headers(response.headers());
        tracing::debug!(
            "Download {} response {} ({:?} bytes)",
            job.id(),
            status_code,
            content_length
        );

        if params.begin_events {
            self.ctx.emit(TransferEvent::DownloadBegin {
                job_id: job.id(),
                status_code,
                content_length,
                headers: headers.clone(),
            });
        }

        let mut sink = self.ctx.resolver.open_for_write(&params.to_file, false).await?;

        let throttler = ProgressThrottler::new(params.progress_interval, params.progress_divider);
        let mut progress = ProgressState::new(content_length, Instant::now());
        let chunk_size = self.ctx.config.chunk_size.max(1);

        loop {
            let chunk = within(
                read_timeout,
                "timed out reading response body",
                response.chunk(),
            )
            .await?;
            let Some(chunk) = chunk else {
                break;
            };

            for piece in chunk.chunks(chunk_size) {
                sink.write_all(piece)
                    .await
                    .map_err(|e| TransferError::from(e).with_path(&params.to_file))?;
                job.record_progress(progress.advance(piece.len()));

                if job.is_cancel_requested() {
                    return Ok(self.stop(job, sink, status_code, &progress).await);
                }
                if params.progress_events && throttler.should_emit(&mut progress, Instant::now()) {
                    self.emit_progress(job, &progress);
                }
            }
        }

        sink.flush()
            .await
            .map_err(|e| TransferError::from(e).with_path(&params.to_file))?;
        sink.shutdown()
            .await
            .map_err(|e| TransferError::from(e).with_path(&params.to_file))?;

        if params.progress_events && throttler.finish(&mut progress, Instant::now()) {
            self.emit_progress(job, &progress);
        }

        tracing::info!(
            "Download {} finished: {} bytes to {}",
            job.id(),
            progress.bytes_transferred,
            params.to_file
        );
        Ok(TransferResult::download_completed(
            job.id(),
            status_code,
            progress.bytes_transferred,
            headers,
        ))
    }

    /// Flush what was written and report cancellation; the partial file stays
    async fn stop(
        &self,
        job: &Job,
        mut sink: BoxedWriter,
        status_code: u16,
        progress: &ProgressState,
    ) -> TransferResult {
        if let Err(e) = sink.shutdown().await {
            tracing::debug!("Download {} sink close after stop failed: {}", job.id(), e);
        }
        tracing::info!(
            "Download {} stopped after {} bytes",
            job.id(),
            progress.bytes_transferred
        );
        TransferResult::cancelled(
            job.id(),
            Direction::Download,
            Some(status_code),
            progress.bytes_transferred,
        )
    }

    fn emit_progress(&self, job: &Job, progress: &ProgressState) {
        self.ctx.emit(TransferEvent::DownloadProgress {
            job_id: job.id(),
            content_length: progress.content_length,
            bytes_written: progress.bytes_transferred,
        });
    }
}
