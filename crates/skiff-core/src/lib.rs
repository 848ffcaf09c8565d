//! # skiff core
//!
//! HTTP transfer job subsystem: concurrent downloads and uploads identified
//! by caller-chosen job ids, streamed in fixed-size chunks, with throttled
//! progress events and cooperative cancellation.
//!
//! This crate provides:
//! - Job registry (id to job handle, concurrency-safe)
//! - Progress throttling by interval and content fraction
//! - Streaming download engine (response body to sink)
//! - Streaming upload engine (raw body or `multipart/form-data`)
//! - Controller facade with per-job completion futures
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       JobController                             │
//! │   (validate, register, spawn worker, stop, completion)          │
//! ├────────────────────────────┬────────────────────────────────────┤
//! │       DownloadEngine       │          UploadEngine              │
//! │  (GET, sink, progress)     │  (raw/multipart body, progress)    │
//! ├────────────────────────────┴────────────────────────────────────┤
//! │     JobRegistry  ·  ProgressThrottler  ·  EventSink             │
//! │     ByteResolver (sources and sinks)                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use skiff_core::{DownloadParams, JobController, events::ChannelSink};
//! use std::sync::Arc;
//!
//! # async fn run() -> skiff_core::Result<()> {
//! let (sink, mut events) = ChannelSink::new();
//! let controller = JobController::new(Arc::new(sink));
//!
//! let completion = controller.download(
//!     DownloadParams::new(1, "https://example.com/big.bin", "/tmp/big.bin").events(true, true),
//! )?;
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{} {:?}", event.name(), event.progress_bytes());
//!     }
//! });
//!
//! let result = completion.await;
//! println!("{}", result.to_payload());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod job;
pub mod params;
pub mod progress;
pub mod resolver;
pub mod result;

pub use config::EngineConfig;
pub use controller::{JobCompletion, JobController};
pub use error::{Result, TransferError};
pub use events::{EventSink, TransferEvent};
pub use job::{Direction, Job, JobId, JobRegistry, JobSnapshot, JobState};
pub use params::{DownloadParams, HeaderList, TransferParams, UploadFile, UploadParams};
pub use progress::{ProgressState, ProgressThrottler};
pub use resolver::{ByteResolver, ByteSource, FsResolver};
pub use result::TransferResult;
