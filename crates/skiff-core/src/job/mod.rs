//! Job handles and lifecycle state.
//!
//! A [`Job`] is the shared half of one in-flight transfer: the registry and
//! the caller see it through an `Arc`, the worker executing the transfer is
//! the only writer of its state and progress counter.
//!
//! # State machine
//!
//! ```text
//! Pending ──start──> Running ──finish──> Completed | Failed | Cancelled
//!    │                                        ^
//!    └──────────────finish (cancelled)────────┘
//! ```
//!
//! Terminal states never transition again.

pub mod registry;

pub use registry::JobRegistry;

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

/// Caller-chosen job identifier, unique among active jobs
pub type JobId = i32;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// HTTP response body streamed into a local sink
    Download,
    /// Local sources streamed into an HTTP request body
    Upload,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum JobState {
    /// Registered, worker not started yet
    Pending = 0,
    /// Worker is streaming bytes
    Running = 1,
    /// Transfer finished normally
    Completed = 2,
    /// Transfer failed
    Failed = 3,
    /// Transfer stopped by the caller
    Cancelled = 4,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Check if no further transitions can occur
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Shared handle for one transfer job
#[derive(Debug)]
pub struct Job {
    id: JobId,
    direction: Direction,
    state: AtomicU8,
    cancel_requested: AtomicBool,
    bytes_transferred: AtomicU64,
}

impl Job {
    /// Create a new job in the `Pending` state
    #[must_use]
    pub fn new(id: JobId, direction: Direction) -> Self {
        Self {
            id,
            direction,
            state: AtomicU8::new(JobState::Pending as u8),
            cancel_requested: AtomicBool::new(false),
            bytes_transferred: AtomicU64::new(0),
        }
    }

    /// Job identifier
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Transfer direction
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `Pending` to `Running`
    ///
    /// Returns false if the job was not pending.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(
                JobState::Pending as u8,
                JobState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move a non-terminal job into a terminal state
    ///
    /// Returns false (and leaves the state alone) if the job already
    /// terminated or `terminal` is not a terminal state.
    pub fn finish(&self, terminal: JobState) -> bool {
        if !terminal.is_terminal() {
            return false;
        }
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if JobState::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                terminal as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Set the cancellation flag
    ///
    /// Ignored once the job is terminal. Returns true if the flag was set by
    /// this call.
    pub fn request_cancel(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        !self.cancel_requested.swap(true, Ordering::AcqRel)
    }

    /// Check the cancellation flag
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Bytes moved so far
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Acquire)
    }

    /// Publish the worker's byte counter
    pub(crate) fn record_progress(&self, bytes: u64) {
        self.bytes_transferred.fetch_max(bytes, Ordering::AcqRel);
    }

    /// Point-in-time view for callers
    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            direction: self.direction,
            state: self.state(),
            cancel_requested: self.is_cancel_requested(),
            bytes_transferred: self.bytes_transferred(),
        }
    }
}

/// Copy of a job's observable fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    /// Job identifier
    pub job_id: JobId,
    /// Transfer direction
    pub direction: Direction,
    /// Lifecycle state
    pub state: JobState,
    /// Whether `stop` has been requested
    pub cancel_requested: bool,
    /// Bytes moved so far
    pub bytes_transferred: u64,
}
