//! Engine configuration

use crate::error::{Result, TransferError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default streaming chunk size (8 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Largest accepted chunk size (1 MiB)
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default connect timeout (5 s)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default read timeout (15 s)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Settings shared by every job of a controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bytes read from a source per loop iteration
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// User-Agent sent unless the request headers set one
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connect timeout for jobs that do not set their own (0: none)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read timeout for jobs that do not set their own (0: none)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_user_agent() -> String {
    format!("skiff/{}", env!("CARGO_PKG_VERSION"))
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT.as_millis() as u64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            user_agent: default_user_agent(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Default connect timeout as a `Duration`
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Default read timeout as a `Duration`
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Connect timeout for a job, falling back to the configured default
    #[must_use]
    pub fn connect_timeout_or(&self, job: Option<Duration>) -> Duration {
        job.unwrap_or_else(|| self.connect_timeout())
    }

    /// Read timeout for a job, falling back to the configured default
    #[must_use]
    pub fn read_timeout_or(&self, job: Option<Duration>) -> Duration {
        job.unwrap_or_else(|| self.read_timeout())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `TransferError::MalformedParams` if the chunk size is outside
    /// 1 B to 1 MiB or the user agent is not a valid header value.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(TransferError::malformed(
                "chunk size must be between 1 byte and 1 MiB",
            ));
        }
        reqwest::header::HeaderValue::from_str(&self.user_agent)
            .map_err(|_| TransferError::malformed("user agent is not a valid header value"))?;
        Ok(())
    }
}
