//! Upload engine

use super::body::DEFAULT_CONTENT_TYPE;
use super::{EngineContext, MultipartBuilder, RequestBody, collect_headers, within};
use crate::error::{Result, TransferError};
use crate::events::TransferEvent;
use crate::job::{Direction, Job};
use crate::params::UploadParams;
use crate::progress::{ProgressState, ProgressThrottler};
use crate::result::TransferResult;
use futures_util::Stream;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sends files as a raw body or a multipart form
#[derive(Debug, Clone)]
pub struct UploadEngine {
    ctx: EngineContext,
}

impl UploadEngine {
    /// Create an engine
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Run `params` to completion for `job`
    ///
    /// Never fails: every outcome is folded into the returned
    /// [`TransferResult`], and the job is left in the matching terminal
    /// state. A stop request wins over any error raised while it lands.
    pub async fn execute(&self, job: Arc<Job>, params: UploadParams) -> TransferResult {
        job.start();
        let mut status = None;
        let result = match self.run(&job, &params, &mut status).await {
            Ok(result) => result,
            Err(err) if job.is_cancel_requested() => {
                tracing::debug!("Upload {} stopped while failing: {}", job.id(), err);
                TransferResult::cancelled(job.id(), Direction::Upload, status, job.bytes_transferred())
            }
            Err(err) => {
                tracing::warn!("Upload {} failed: {}", job.id(), err);
                TransferResult::failed(
                    job.id(),
                    Direction::Upload,
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
        job: &Arc<Job>,
        params: &UploadParams,
        status: &mut Option<u16>,
    ) -> Result<TransferResult> {
        let (url, method) = params.validate()?;
        if job.is_cancel_requested() {
            return Ok(TransferResult::cancelled(job.id(), Direction::Upload, None, 0));
        }

        let body = self.build_body(params).await?;
        let expected_len = body.expected_len();
        tracing::debug!(
            "Upload {} {} {} ({:?} bytes, {})",
            job.id(),
            method,
            url,
            expected_len,
            body.content_type()
        );

        let config = &self.ctx.config;
        let read_timeout = config.read_timeout_or(params.read_timeout);
        let client = self
            .ctx
            .client(config.connect_timeout_or(params.connect_timeout))?;
        let raw = params.sends_raw_body();
        let mut request = client.request(method, url);
        for (name, value) in params.headers.iter() {
            // Multipart framing owns the content type; the body owns its length
            let owned_by_body = name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str())
                || (!raw && name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
            if !owned_by_body {
                request = request.header(name, value);
            }
        }
        if !raw || !params.headers.contains(CONTENT_TYPE.as_str()) {
            request = request.header(CONTENT_TYPE, body.content_type());
        }
        if let Some(len) = expected_len {
            request = request.header(CONTENT_LENGTH, len);
        }

        if params.begin_events {
            self.ctx.emit(TransferEvent::UploadBegin { job_id: job.id() });
        }

        let stream = BodyProgress {
            body,
            progress: ProgressState::new(expected_len, Instant::now()),
            throttler: ProgressThrottler::new(params.progress_interval, params.progress_divider),
            job: Arc::clone(job),
            ctx: self.ctx.clone(),
            emit_progress: params.progress_events,
            chunk_size: self.ctx.config.chunk_size.max(1),
            done: false,
        }
        .into_stream();
        let request = request.body(reqwest::Body::wrap_stream(stream));

        let response = send_watched(job, read_timeout, request.send()).await?;
        if job.is_cancel_requested() {
            return Ok(TransferResult::cancelled(
                job.id(),
                Direction::Upload,
                Some(response.status().as_u16()),
                job.bytes_transferred(),
            ));
        }

        let status_code = response.status().as_u16();
        *status = Some(status_code);
        let headers = collect_headers(response.headers());
        let text = within(
            read_timeout,
            "timed out reading response body",
            response.text(),
        )
        .await?;

        tracing::info!(
            "Upload {} finished: {} bytes sent, status {}",
            job.id(),
            job.bytes_transferred(),
            status_code
        );
        Ok(TransferResult::upload_completed(
            job.id(),
            status_code,
            job.bytes_transferred(),
            headers,
            text,
        ))
    }

    /// Open every source and frame the request body
    async fn build_body(&self, params: &UploadParams) -> Result<RequestBody> {
        if params.sends_raw_body() {
            let file = &params.files[0];
            let source = self.ctx.resolver.open_for_read(&file.filepath).await?;
            let content_type = file.filetype.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
            return Ok(RequestBody::raw(source, content_type));
        }

        let mut builder = MultipartBuilder::with_random_boundary();
        for (name, value) in &params.fields {
            builder = builder.field(name, value);
        }
        for file in &params.files {
            let source = self.ctx.resolver.open_for_read(&file.filepath).await?;
            let filename = file
                .filename
                .clone()
                .or_else(|| source.name.clone())
                .unwrap_or_else(|| file.name.clone());
            let content_type = file
                .filetype
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
            builder = builder.file(&file.name, &filename, &content_type, source);
        }
        Ok(builder.finish())
    }
}

/// How often the response wait looks at the cancel flag and byte counter
const WATCH_TICK: Duration = Duration::from_millis(50);

/// Await the response while the body is streamed
///
/// Fails with `Cancelled` once a stop is requested, and with
/// `NetworkTimeout` once a full read-timeout window passes with no body
/// bytes handed to the connection (zero: no limit).
async fn send_watched<F>(job: &Job, limit: Duration, send: F) -> Result<reqwest::Response>
where
    F: Future<Output = reqwest::Result<reqwest::Response>>,
{
    tokio::pin!(send);
    let mut last_seen = job.bytes_transferred();
    let mut idle = Duration::ZERO;
    loop {
        tokio::select! {
            response = &mut send => return response.map_err(Into::into),
            () = tokio::time::sleep(WATCH_TICK) => {
                if job.is_cancel_requested() {
                    return Err(TransferError::Cancelled);
                }
                let seen = job.bytes_transferred();
                if seen != last_seen {
                    last_seen = seen;
                    idle = Duration::ZERO;
                    continue;
                }
                idle += WATCH_TICK;
                if !limit.is_zero() && idle >= limit {
                    return Err(TransferError::timeout("timed out waiting for upload response"));
                }
            }
        }
    }
}

/// Request body wrapper that counts, throttles and checks for stop requests
struct BodyProgress {
    body: RequestBody,
    progress: ProgressState,
    throttler: ProgressThrottler,
    job: Arc<Job>,
    ctx: EngineContext,
    emit_progress: bool,
    chunk_size: usize,
    done: bool,
}

impl BodyProgress {
    fn into_stream(self) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
        futures_util::stream::unfold(self, |mut state| async move {
            if state.done {
                return None;
            }
            if state.job.is_cancel_requested() {
                state.done = true;
                let err = io::Error::new(io::ErrorKind::Interrupted, "upload stopped");
                return Some((Err(err), state));
            }

            match state.body.next_chunk(state.chunk_size).await {
                Ok(Some(chunk)) => {
                    state.record(chunk.len());
                    Some((Ok(chunk), state))
                }
                Ok(None) => {
                    state.done = true;
                    if state.emit_progress && state.throttler.finish(&mut state.progress, Instant::now()) {
                        state.emit();
                    }
                    None
                }
                Err(err) => {
                    state.done = true;
                    Some((Err(err), state))
                }
            }
        })
    }

    fn record(&mut self, len: usize) {
        self.job.record_progress(self.progress.advance(len));
        if self.emit_progress && self.throttler.should_emit(&mut self.progress, Instant::now()) {
            self.emit();
        }
    }

    fn emit(&self) {
        self.ctx.emit(TransferEvent::UploadProgress {
            job_id: self.job.id(),
            total_bytes_expected_to_send: self.progress.content_length,
            total_bytes_sent: self.progress.bytes_transferred,
        });
    }
}
