//! Byte source and sink resolution.
//!
//! Engines never open files directly; they ask a [`ByteResolver`] to turn a
//! descriptor into a readable source or writable sink. [`FsResolver`] handles
//! plain paths and `file://` URIs on the local filesystem; hosts with other
//! storage (bundled assets, content providers) plug in their own resolver.

use crate::error::{Result, TransferError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};

/// Readable byte stream
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable byte stream
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An opened source
pub struct ByteSource {
    /// Stream of the source's bytes
    pub reader: BoxedReader,
    /// Length in bytes, if known up front
    pub len: Option<u64>,
    /// Display name (usually the file name)
    pub name: Option<String>,
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("len", &self.len)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ByteSource {
    /// Wrap an in-memory buffer
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>, name: Option<String>) -> Self {
        let len = bytes.len() as u64;
        Self {
            reader: Box::new(std::io::Cursor::new(bytes)),
            len: Some(len),
            name,
        }
    }
}

/// Opens byte streams for descriptors
#[async_trait]
pub trait ByteResolver: Send + Sync {
    /// Open a descriptor for reading
    ///
    /// Fails with `NotFound` or `IsDirectory`.
    async fn open_for_read(&self, descriptor: &str) -> Result<ByteSource>;

    /// Open a descriptor for writing, appending or truncating
    ///
    /// Fails with `NotFound` (or `IsDirectory` for a directory target).
    async fn open_for_write(&self, descriptor: &str, append: bool) -> Result<BoxedWriter>;
}

/// Local filesystem resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct FsResolver;

impl FsResolver {
    /// Map a descriptor to a filesystem path
    ///
    /// Accepts plain paths and `file://` URIs.
    #[must_use]
    pub fn path_for(descriptor: &str) -> PathBuf {
        match descriptor.strip_prefix("file://") {
            Some(rest) => url::Url::parse(descriptor)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .unwrap_or_else(|| PathBuf::from(rest)),
            None => PathBuf::from(descriptor),
        }
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(ToString::to_string)
}

#[async_trait]
impl ByteResolver for FsResolver {
    async fn open_for_read(&self, descriptor: &str) -> Result<ByteSource> {
        let path = Self::path_for(descriptor);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| TransferError::from(e).with_path(descriptor))?;
        if metadata.is_dir() {
            return Err(TransferError::IsDirectory(
                format!("illegal operation on a directory, read '{descriptor}'").into(),
            ));
        }

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| TransferError::from(e).with_path(descriptor))?;

        Ok(ByteSource {
            reader: Box::new(file),
            len: Some(metadata.len()),
            name: file_name(&path),
        })
    }

    async fn open_for_write(&self, descriptor: &str, append: bool) -> Result<BoxedWriter> {
        let path = Self::path_for(descriptor);
        if tokio::fs::metadata(&path)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            return Err(TransferError::IsDirectory(
                format!("illegal operation on a directory, open '{descriptor}'").into(),
            ));
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await
            .map_err(|e| TransferError::from(e).with_path(descriptor))?;

        Ok(Box::new(file))
    }
}
