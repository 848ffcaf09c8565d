//! Upload request bodies
//!
//! A [`RequestBody`] is a queue of segments: inline framing bytes and opened
//! byte sources. The upload engine pulls it chunk by chunk, so file contents
//! are streamed rather than buffered.
//!
//! # Multipart layout
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="<field>"\r\n
//! \r\n
//! <value>\r\n
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="<name>"; filename="<filename>"\r\n
//! Content-Type: <type>\r\n
//! \r\n
//! <file bytes>\r\n
//! --<boundary>--\r\n
//! ```

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::resolver::ByteSource;
use std::collections::VecDeque;
use std::io;
use tokio::io::AsyncReadExt;

/// Content type used when a file part does not name one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Generate a fresh multipart boundary token
#[must_use]
pub fn generate_boundary() -> String {
    format!("----skiff{}", hex::encode(rand::random::<[u8; 16]>()))
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

enum Segment {
    Inline(Vec<u8>),
    Source(ByteSource),
}

/// Streamed request body
pub struct RequestBody {
    segments: VecDeque<Segment>,
    content_type: String,
    expected_len: Option<u64>,
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody")
            .field("segments", &self.segments.len())
            .field("content_type", &self.content_type)
            .field("expected_len", &self.expected_len)
            .finish()
    }
}

impl RequestBody {
    /// Body consisting of one source's raw bytes
    #[must_use]
    pub fn raw(source: ByteSource, content_type: impl Into<String>) -> Self {
        let expected_len = source.len;
        let mut segments = VecDeque::with_capacity(1);
        segments.push_back(Segment::Source(source));
        Self {
            segments,
            content_type: content_type.into(),
            expected_len,
        }
    }

    /// `Content-Type` header value for this body
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Total size, if every segment's size is known
    #[must_use]
    pub fn expected_len(&self) -> Option<u64> {
        self.expected_len
    }

    /// Pull up to `max` bytes
    ///
    /// Returns `Ok(None)` once every segment is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the underlying read error of a source segment.
    pub async fn next_chunk(&mut self, max: usize) -> io::Result<Option<Vec<u8>>> {
        let max = max.max(1);
        loop {
            let Some(front) = self.segments.front_mut() else {
                return Ok(None);
            };
            match front {
                Segment::Inline(bytes) => {
                    if bytes.is_empty() {
                        self.segments.pop_front();
                        continue;
                    }
                    let take = max.min(bytes.len());
                    let rest = bytes.split_off(take);
                    return Ok(Some(std::mem::replace(bytes, rest)));
                }
                Segment::Source(source) => {
                    let mut buf = vec![0u8; max];
                    let read = source.reader.read(&mut buf).await?;
                    if read == 0 {
                        self.segments.pop_front();
                        continue;
                    }
                    buf.truncate(read);
                    return Ok(Some(buf));
                }
            }
        }
    }

    /// Drain the whole body into memory
    ///
    /// # Errors
    ///
    /// Returns the first read error of a source segment.
    pub async fn read_to_end(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.expected_len.unwrap_or(0) as usize);
        while let Some(chunk) = self.next_chunk(DEFAULT_CHUNK_SIZE).await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

/// Builder for `multipart/form-data` bodies
pub struct MultipartBuilder {
    boundary: String,
    segments: VecDeque<Segment>,
    expected_len: Option<u64>,
}

impl MultipartBuilder {
    /// Start a body delimited by `boundary`
    #[must_use]
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            segments: VecDeque::new(),
            expected_len: Some(0),
        }
    }

    /// Start a body with a freshly generated boundary
    #[must_use]
    pub fn with_random_boundary() -> Self {
        Self::new(generate_boundary())
    }

    /// Boundary token
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn push_inline(&mut self, bytes: Vec<u8>) {
        self.expected_len = self.expected_len.map(|len| len + bytes.len() as u64);
        self.segments.push_back(Segment::Inline(bytes));
    }

    /// Append a plain form field
    #[must_use]
    pub fn field(mut self, name: &str, value: &str) -> Self {
        let part = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            self.boundary,
            escape_quoted(name),
            value
        );
        self.push_inline(part.into_bytes());
        self
    }

    /// Append a file part streamed from `source`
    #[must_use]
    pub fn file(
        mut self,
        name: &str,
        filename: &str,
        content_type: &str,
        source: ByteSource,
    ) -> Self {
        let header = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            self.boundary,
            escape_quoted(name),
            escape_quoted(filename),
            content_type
        );
        self.push_inline(header.into_bytes());

        self.expected_len = match (self.expected_len, source.len) {
            (Some(total), Some(len)) => Some(total + len),
            _ => None,
        };
        self.segments.push_back(Segment::Source(source));

        self.push_inline(b"\r\n".to_vec());
        self
    }

    /// Append the closing boundary
    #[must_use]
    pub fn finish(mut self) -> RequestBody {
        let closing = format!("--{}--\r\n", self.boundary);
        self.push_inline(closing.into_bytes());
        RequestBody {
            content_type: format!("multipart/form-data; boundary={}", self.boundary),
            segments: self.segments,
            expected_len: self.expected_len,
        }
    }
}
