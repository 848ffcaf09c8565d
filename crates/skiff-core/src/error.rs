//! Error types for transfer jobs
//!
//! Every failure a job can run into is captured as a [`TransferError`] and
//! carried inside the job's [`TransferResult`](crate::TransferResult); nothing
//! crosses the worker boundary as a panic.
//!
//! # Error Categories
//!
//! - **Transient**: network failures that may succeed if the caller submits
//!   a new job (timeouts, refused connections, mid-stream resets)
//! - **Permanent**: failures that need intervention (missing files, bad
//!   parameters, duplicate job ids)
//!
//! No layer retries on its own. The classification is informational only.
//!
//! # Host error codes
//!
//! Each variant maps to a short code (see [`TransferError::code`]) so that a
//! host can surface an error code/message pair:
//!
//! | Variant | Code |
//! |---|---|
//! | `NotFound` | `ENOENT` |
//! | `IsDirectory` | `EISDIR` |
//! | `NetworkTimeout` | `ETIMEDOUT` |
//! | `NetworkError` | `ENETWORK` |
//! | `Cancelled` | `ECANCELED` |
//! | `MalformedParams` | `EINVAL` |
//! | `DuplicateJob` | `EEXIST` |
//! | `JobNotFound` | `ESRCH` |
//! | `Unknown` | `EUNSPECIFIED` |

use crate::job::JobId;
use std::borrow::Cow;
use std::io;
use thiserror::Error;

/// Errors that can occur while submitting or executing a transfer job
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Source or destination does not exist
    #[error("ENOENT: {0}")]
    NotFound(Cow<'static, str>),

    /// Illegal operation on a directory
    #[error("EISDIR: {0}")]
    IsDirectory(Cow<'static, str>),

    /// Connect or read timeout exceeded
    #[error("Network timeout: {0}")]
    NetworkTimeout(Cow<'static, str>),

    /// Connection refused, DNS failure or mid-stream I/O error
    #[error("Network error: {0}")]
    NetworkError(Cow<'static, str>),

    /// Caller-initiated stop
    #[error("Transfer cancelled")]
    Cancelled,

    /// Missing required field or invalid URL
    #[error("Malformed parameters: {0}")]
    MalformedParams(Cow<'static, str>),

    /// A job with this id is already active
    #[error("Job {0} is already active")]
    DuplicateJob(JobId),

    /// No active job with this id
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// Unclassified failure, original message preserved
    #[error("{0}")]
    Unknown(Cow<'static, str>),
}

impl TransferError {
    /// Host-facing error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            TransferError::NotFound(_) => "ENOENT",
            TransferError::IsDirectory(_) => "EISDIR",
            TransferError::NetworkTimeout(_) => "ETIMEDOUT",
            TransferError::NetworkError(_) => "ENETWORK",
            TransferError::Cancelled => "ECANCELED",
            TransferError::MalformedParams(_) => "EINVAL",
            TransferError::DuplicateJob(_) => "EEXIST",
            TransferError::JobNotFound(_) => "ESRCH",
            TransferError::Unknown(_) => "EUNSPECIFIED",
        }
    }

    /// Returns true if a fresh job for the same transfer might succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::NetworkTimeout(_) | TransferError::NetworkError(_)
        )
    }

    /// Returns true if the failure will repeat without intervention
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TransferError::NotFound(_)
                | TransferError::IsDirectory(_)
                | TransferError::MalformedParams(_)
                | TransferError::DuplicateJob(_)
                | TransferError::JobNotFound(_)
        )
    }

    /// Returns true for a caller-initiated stop
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }

    /// Create a not-found error with static context (zero allocation)
    #[must_use]
    pub const fn not_found(context: &'static str) -> Self {
        TransferError::NotFound(Cow::Borrowed(context))
    }

    /// Create a network error with static context (zero allocation)
    #[must_use]
    pub const fn network(context: &'static str) -> Self {
        TransferError::NetworkError(Cow::Borrowed(context))
    }

    /// Create a timeout error with static context (zero allocation)
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        TransferError::NetworkTimeout(Cow::Borrowed(context))
    }

    /// Create a malformed-params error with static context (zero allocation)
    #[must_use]
    pub const fn malformed(context: &'static str) -> Self {
        TransferError::MalformedParams(Cow::Borrowed(context))
    }

    /// Attach the offending path or URL to a filesystem error message
    #[must_use]
    pub fn with_path(self, path: &str) -> Self {
        match self {
            TransferError::NotFound(msg) => {
                TransferError::NotFound(format!("{msg}, open '{path}'").into())
            }
            TransferError::IsDirectory(msg) => {
                TransferError::IsDirectory(format!("{msg}, open '{path}'").into())
            }
            other => other,
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        let message: Cow<'static, str> = err.to_string().into();
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
                TransferError::NotFound(message)
            }
            io::ErrorKind::IsADirectory => TransferError::IsDirectory(message),
            io::ErrorKind::TimedOut => TransferError::NetworkTimeout(message),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable => TransferError::NetworkError(message),
            _ => TransferError::Unknown(message),
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        let message: Cow<'static, str> = err.to_string().into();
        if err.is_timeout() {
            TransferError::NetworkTimeout(message)
        } else if err.is_builder() {
            TransferError::MalformedParams(message)
        } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
            TransferError::NetworkError(message)
        } else {
            TransferError::Unknown(message)
        }
    }
}

impl From<url::ParseError> for TransferError {
    fn from(err: url::ParseError) -> Self {
        TransferError::MalformedParams(format!("invalid URL: {err}").into())
    }
}

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;
