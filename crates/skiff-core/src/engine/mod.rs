//! Streaming transfer engines.
//!
//! Each engine executes exactly one job on the worker that owns it:
//!
//! ```text
//! Download                                  Upload
//!     |                                         |
//!     |-- GET (headers, timeouts) -->           |-- open every source
//!     |<-- status + headers                     |-- build raw / multipart body
//!     |-- DownloadBegin                         |-- UploadBegin
//!     |-- open sink (truncate)                  |-- send body chunk by chunk
//!     |-- body chunks -> sink                   |     (cancel check, throttled
//!     |     (cancel check, throttled            |      UploadProgress)
//!     |      DownloadProgress)                  |<-- status + headers + body
//!     |                                         |
//!     |    [TransferResult]                     |    [TransferResult]
//! ```
//!
//! Failures are classified into a [`TransferResult`] on the worker; a set
//! cancellation flag always wins over an I/O error seen at the same time.

pub mod body;
pub mod download;
pub mod upload;

pub use body::{MultipartBuilder, RequestBody, generate_boundary};
pub use download::DownloadEngine;
pub use upload::UploadEngine;

use crate::config::EngineConfig;
use crate::error::{Result, TransferError};
use crate::events::{EventSink, TransferEvent};
use crate::params::HeaderList;
use crate::resolver::ByteResolver;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators shared by the engines of one controller
#[derive(Clone)]
pub struct EngineContext {
    /// Opens sources and sinks
    pub resolver: Arc<dyn ByteResolver>,
    /// Receives begin/progress events
    pub events: Arc<dyn EventSink>,
    /// Engine settings
    pub config: EngineConfig,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// Bundle collaborators
    pub fn new(
        resolver: Arc<dyn ByteResolver>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            resolver,
            events,
            config,
        }
    }

    pub(crate) fn emit(&self, event: TransferEvent) {
        tracing::trace!(
            "Job {} event {} ({:?})",
            event.job_id(),
            event.name(),
            event.progress_bytes()
        );
        self.events.emit(event);
    }

    /// HTTP client for one job
    ///
    /// Each job owns its client so that its connections are released when
    /// the job ends.
    pub(crate) fn client(&self, connect_timeout: Duration) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(self.config.user_agent.clone());
        if !connect_timeout.is_zero() {
            builder = builder.connect_timeout(connect_timeout);
        }
        builder
            .build()
            .map_err(|e| TransferError::Unknown(format!("HTTP client setup failed: {e}").into()))
    }
}

/// Await `fut`, failing with `NetworkTimeout` after `limit` (zero: no limit)
pub(crate) async fn within<T, E, F>(limit: Duration, context: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<TransferError>,
{
    if limit.is_zero() {
        return fut.await.map_err(Into::into);
    }
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(TransferError::timeout(context)),
    }
}

/// Copy response headers, keeping the first value of repeated names
pub(crate) fn collect_headers(map: &reqwest::header::HeaderMap) -> HeaderList {
    let mut headers = HeaderList::new();
    for (name, value) in map {
        if headers.contains(name.as_str()) {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers.insert(name.as_str(), value);
    }
    headers
}

/// Apply caller headers to a request
pub(crate) fn apply_headers(
    mut request: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> reqwest::RequestBuilder {
    for (name, value) in headers.iter() {
        request = request.header(name, value);
    }
    request
}
