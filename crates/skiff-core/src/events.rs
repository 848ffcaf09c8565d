//! Transfer events and event sinks
//!
//! Engines report `Begin` and `Progress` events through an [`EventSink`].
//! `emit` must never block the transfer loop: [`ChannelSink`] buffers without
//! bound, [`BoundedChannelSink`] drops events once its buffer is full and
//! counts the drops, [`NullSink`] discards everything.
//!
//! A job's events are emitted from its single worker in order, so every sink
//! preserves per-job ordering. Events of different jobs interleave freely.

use crate::job::JobId;
use crate::params::HeaderList;
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

fn length_or_unknown<S: Serializer>(
    length: &Option<u64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match length {
        Some(len) => serializer.serialize_u64(*len),
        None => serializer.serialize_i64(-1),
    }
}

/// Structured event delivered to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum TransferEvent {
    /// Response headers received, before the first body byte is read
    DownloadBegin {
        /// Job identifier
        job_id: JobId,
        /// HTTP status
        status_code: u16,
        /// Advertised length (`-1` on the wire when unknown)
        #[serde(serialize_with = "length_or_unknown")]
        content_length: Option<u64>,
        /// Response headers
        headers: HeaderList,
    },
    /// Bytes written to the download sink so far
    DownloadProgress {
        /// Job identifier
        job_id: JobId,
        /// Advertised length (`-1` on the wire when unknown)
        #[serde(serialize_with = "length_or_unknown")]
        content_length: Option<u64>,
        /// Bytes written so far
        bytes_written: u64,
    },
    /// Upload body about to be sent
    UploadBegin {
        /// Job identifier
        job_id: JobId,
    },
    /// Bytes of the request body sent so far
    UploadProgress {
        /// Job identifier
        job_id: JobId,
        /// Body size (`-1` on the wire when unknown)
        #[serde(serialize_with = "length_or_unknown")]
        total_bytes_expected_to_send: Option<u64>,
        /// Bytes sent so far
        total_bytes_sent: u64,
    },
}

impl TransferEvent {
    /// Event name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DownloadBegin { .. } => "DownloadBegin",
            Self::DownloadProgress { .. } => "DownloadProgress",
            Self::UploadBegin { .. } => "UploadBegin",
            Self::UploadProgress { .. } => "UploadProgress",
        }
    }

    /// Job the event belongs to
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::DownloadBegin { job_id, .. }
            | Self::DownloadProgress { job_id, .. }
            | Self::UploadBegin { job_id }
            | Self::UploadProgress { job_id, .. } => *job_id,
        }
    }

    /// Byte count carried by a progress event
    #[must_use]
    pub fn progress_bytes(&self) -> Option<u64> {
        match self {
            Self::DownloadProgress { bytes_written, .. } => Some(*bytes_written),
            Self::UploadProgress {
                total_bytes_sent, ..
            } => Some(*total_bytes_sent),
            _ => None,
        }
    }

    /// Check for a progress event
    #[must_use]
    pub fn is_progress(&self) -> bool {
        self.progress_bytes().is_some()
    }

    /// Payload without the event name, as delivered to the host
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(object) = value.as_object_mut() {
            object.remove("event");
        }
        value
    }
}

/// Destination for transfer events
///
/// Implementations must return promptly; buffer or drop rather than wait.
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn emit(&self, event: TransferEvent);
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TransferEvent) {}
}

/// Unbounded channel sink; never blocks, never drops while the receiver lives
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver the host drains
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: TransferEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event receiver closed, event discarded");
        }
    }
}

/// Bounded channel sink; drops events when the buffer is full
#[derive(Debug)]
pub struct BoundedChannelSink {
    tx: mpsc::Sender<TransferEvent>,
    dropped: AtomicU64,
}

impl BoundedChannelSink {
    /// Create a sink buffering at most `capacity` events
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransferEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of events dropped because the buffer was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for BoundedChannelSink {
    fn emit(&self, event: TransferEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "Event buffer full, dropped {} for job {} ({} dropped so far)",
                    event.name(),
                    event.job_id(),
                    dropped
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("Event receiver closed, event discarded");
            }
        }
    }
}

impl<F> EventSink for F
where
    F: Fn(TransferEvent) + Send + Sync,
{
    fn emit(&self, event: TransferEvent) {
        self(event);
    }
}
