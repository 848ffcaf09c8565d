//! Terminal outcome of a transfer job.

use crate::error::TransferError;
use crate::job::{Direction, JobId, JobState};
use crate::params::HeaderList;
use serde_json::{Map, Value, json};

/// Result delivered exactly once per job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Job identifier
    pub job_id: JobId,
    /// Transfer direction
    pub direction: Direction,
    /// Terminal state (`Completed`, `Failed` or `Cancelled`)
    pub state: JobState,
    /// HTTP status, once a response was received
    pub status_code: Option<u16>,
    /// Bytes written to the sink (download) or sent (upload)
    pub bytes_transferred: u64,
    /// Response headers (downloads only carry them for 2xx responses)
    pub headers: Option<HeaderList>,
    /// Response body text (uploads)
    pub body: Option<String>,
    /// Failure cause for `Failed` and `Cancelled`
    pub error: Option<TransferError>,
}

impl TransferResult {
    /// Completed download
    #[must_use]
    pub fn download_completed(
        job_id: JobId,
        status_code: u16,
        bytes_written: u64,
        headers: HeaderList,
    ) -> Self {
        let headers = (200..300).contains(&status_code).then_some(headers);
        Self {
            job_id,
            direction: Direction::Download,
            state: JobState::Completed,
            status_code: Some(status_code),
            bytes_transferred: bytes_written,
            headers,
            body: None,
            error: None,
        }
    }

    /// Completed upload
    #[must_use]
    pub fn upload_completed(
        job_id: JobId,
        status_code: u16,
        bytes_sent: u64,
        headers: HeaderList,
        body: String,
    ) -> Self {
        Self {
            job_id,
            direction: Direction::Upload,
            state: JobState::Completed,
            status_code: Some(status_code),
            bytes_transferred: bytes_sent,
            headers: Some(headers),
            body: Some(body),
            error: None,
        }
    }

    /// Stopped by the caller
    #[must_use]
    pub fn cancelled(
        job_id: JobId,
        direction: Direction,
        status_code: Option<u16>,
        bytes_transferred: u64,
    ) -> Self {
        Self {
            job_id,
            direction,
            state: JobState::Cancelled,
            status_code,
            bytes_transferred,
            headers: None,
            body: None,
            error: Some(TransferError::Cancelled),
        }
    }

    /// Failed with `error`
    #[must_use]
    pub fn failed(
        job_id: JobId,
        direction: Direction,
        status_code: Option<u16>,
        bytes_transferred: u64,
        error: TransferError,
    ) -> Self {
        Self {
            job_id,
            direction,
            state: JobState::Failed,
            status_code,
            bytes_transferred,
            headers: None,
            body: None,
            error: Some(error),
        }
    }

    /// Check for a `Completed` outcome
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Check for a `Cancelled` outcome
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state == JobState::Cancelled
    }

    /// Completion payload for the host
    ///
    /// Successful downloads render `{jobId, statusCode, bytesWritten,
    /// headers?}`, successful uploads `{jobId, statusCode, headers, body}`,
    /// everything else `{jobId, code, message}`.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        if let Some(error) = &self.error {
            return json!({
                "jobId": self.job_id,
                "code": error.code(),
                "message": error.to_string(),
            });
        }

        let mut payload = Map::new();
        payload.insert("jobId".into(), json!(self.job_id));
        payload.insert("statusCode".into(), json!(self.status_code));
        match self.direction {
            Direction::Download => {
                payload.insert("bytesWritten".into(), json!(self.bytes_transferred));
                if let Some(headers) = &self.headers {
                    payload.insert("headers".into(), json!(headers));
                }
            }
            Direction::Upload => {
                payload.insert(
                    "headers".into(),
                    json!(self.headers.clone().unwrap_or_default()),
                );
                payload.insert("body".into(), json!(self.body.clone().unwrap_or_default()));
            }
        }
        Value::Object(payload)
    }
}
