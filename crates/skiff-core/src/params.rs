//! Transfer parameters for download and upload jobs.
//!
//! Parameters are plain data built by the host. [`DownloadParams::validate`]
//! and [`UploadParams::validate`] run synchronously at submission so that a
//! malformed request is rejected before any job is registered.

use crate::error::{Result, TransferError};
use crate::job::{Direction, JobId};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::time::Duration;
use url::Url;

/// Default upload method
pub const DEFAULT_UPLOAD_METHOD: &str = "POST";

/// Ordered header list with case-insensitively unique names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing value with the same name
    ///
    /// The original position of a replaced header is kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Get a header value by case-insensitive name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Check for a header by case-insensitive name
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (name, value) in iter {
            list.insert(name, value);
        }
        list
    }
}

impl Serialize for HeaderList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn validate_url(raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(TransferError::malformed("URL is empty"));
    }
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TransferError::MalformedParams(
            format!("unsupported URL scheme '{other}'").into(),
        )),
    }
}

fn validate_headers(headers: &HeaderList) -> Result<()> {
    for (name, value) in headers.iter() {
        reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            TransferError::MalformedParams(format!("invalid header name '{name}'").into())
        })?;
        reqwest::header::HeaderValue::from_str(value).map_err(|_| {
            TransferError::MalformedParams(format!("invalid value for header '{name}'").into())
        })?;
    }
    Ok(())
}

/// Parameters of a download job
#[derive(Debug, Clone)]
pub struct DownloadParams {
    /// Caller-chosen job id
    pub job_id: JobId,
    /// Source URL
    pub from_url: String,
    /// Destination sink descriptor
    pub to_file: String,
    /// Request headers
    pub headers: HeaderList,
    /// Minimum time between progress events
    pub progress_interval: Duration,
    /// Emit roughly every 1/N of the content length (0 disables)
    pub progress_divider: u32,
    /// Maximum wait for response headers and for each body read
    /// (`None`: the controller's configured default)
    pub read_timeout: Option<Duration>,
    /// Maximum wait for the TCP/TLS connection (`None`: configured default)
    pub connect_timeout: Option<Duration>,
    /// Emit `DownloadBegin`
    pub begin_events: bool,
    /// Emit `DownloadProgress`
    pub progress_events: bool,
}

impl DownloadParams {
    /// Download `from_url` into `to_file` with default settings
    #[must_use]
    pub fn new(job_id: JobId, from_url: impl Into<String>, to_file: impl Into<String>) -> Self {
        Self {
            job_id,
            from_url: from_url.into(),
            to_file: to_file.into(),
            headers: HeaderList::new(),
            progress_interval: Duration::ZERO,
            progress_divider: 0,
            read_timeout: None,
            connect_timeout: None,
            begin_events: false,
            progress_events: false,
        }
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set progress throttling
    #[must_use]
    pub fn progress(mut self, interval: Duration, divider: u32) -> Self {
        self.progress_interval = interval;
        self.progress_divider = divider;
        self
    }

    /// Set connect and read timeouts (zero: no timeout)
    #[must_use]
    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = Some(connect);
        self.read_timeout = Some(read);
        self
    }

    /// Choose which events the job emits
    #[must_use]
    pub fn events(mut self, begin: bool, progress: bool) -> Self {
        self.begin_events = begin;
        self.progress_events = progress;
        self
    }

    /// Check required fields
    ///
    /// # Errors
    ///
    /// Returns `TransferError::MalformedParams` for an invalid URL, an empty
    /// destination or an invalid header.
    pub fn validate(&self) -> Result<Url> {
        let url = validate_url(&self.from_url)?;
        if self.to_file.trim().is_empty() {
            return Err(TransferError::malformed("destination is empty"));
        }
        validate_headers(&self.headers)?;
        Ok(url)
    }
}

/// One file part of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Form field name
    pub name: String,
    /// Source descriptor
    pub filepath: String,
    /// File name sent in the part header (defaults to the source's name)
    pub filename: Option<String>,
    /// MIME type (defaults to `application/octet-stream`)
    pub filetype: Option<String>,
}

impl UploadFile {
    /// File part `name` read from `filepath`
    #[must_use]
    pub fn new(name: impl Into<String>, filepath: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filepath: filepath.into(),
            filename: None,
            filetype: None,
        }
    }

    /// Override the file name sent to the server
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the MIME type
    #[must_use]
    pub fn filetype(mut self, filetype: impl Into<String>) -> Self {
        self.filetype = Some(filetype.into());
        self
    }
}

/// Parameters of an upload job
#[derive(Debug, Clone)]
pub struct UploadParams {
    /// Caller-chosen job id
    pub job_id: JobId,
    /// Destination URL
    pub to_url: String,
    /// HTTP method
    pub method: String,
    /// File parts, in order
    pub files: Vec<UploadFile>,
    /// Plain form fields, in order
    pub fields: Vec<(String, String)>,
    /// Request headers
    pub headers: HeaderList,
    /// Send the single file's raw bytes instead of a multipart body
    pub binary_stream_only: bool,
    /// Minimum time between progress events
    pub progress_interval: Duration,
    /// Emit roughly every 1/N of the body size (0 disables)
    pub progress_divider: u32,
    /// Maximum wait for the response and each response read
    /// (`None`: the controller's configured default)
    pub read_timeout: Option<Duration>,
    /// Maximum wait for the TCP/TLS connection (`None`: configured default)
    pub connect_timeout: Option<Duration>,
    /// Emit `UploadBegin`
    pub begin_events: bool,
    /// Emit `UploadProgress`
    pub progress_events: bool,
}

impl UploadParams {
    /// Upload to `to_url` with default settings
    #[must_use]
    pub fn new(job_id: JobId, to_url: impl Into<String>) -> Self {
        Self {
            job_id,
            to_url: to_url.into(),
            method: DEFAULT_UPLOAD_METHOD.to_string(),
            files: Vec::new(),
            fields: Vec::new(),
            headers: HeaderList::new(),
            binary_stream_only: false,
            progress_interval: Duration::ZERO,
            progress_divider: 0,
            read_timeout: None,
            connect_timeout: None,
            begin_events: false,
            progress_events: false,
        }
    }

    /// Append a file part
    #[must_use]
    pub fn file(mut self, file: UploadFile) -> Self {
        self.files.push(file);
        self
    }

    /// Append a plain form field
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the HTTP method
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Send the single file as the raw request body
    #[must_use]
    pub fn binary_stream_only(mut self, enabled: bool) -> Self {
        self.binary_stream_only = enabled;
        self
    }

    /// Set progress throttling
    #[must_use]
    pub fn progress(mut self, interval: Duration, divider: u32) -> Self {
        self.progress_interval = interval;
        self.progress_divider = divider;
        self
    }

    /// Set connect and read timeouts (zero: no timeout)
    #[must_use]
    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = Some(connect);
        self.read_timeout = Some(read);
        self
    }

    /// Choose which events the job emits
    #[must_use]
    pub fn events(mut self, begin: bool, progress: bool) -> Self {
        self.begin_events = begin;
        self.progress_events = progress;
        self
    }

    /// True when the body is the single file's raw bytes
    #[must_use]
    pub fn sends_raw_body(&self) -> bool {
        self.binary_stream_only && self.files.len() == 1
    }

    /// Check required fields
    ///
    /// # Errors
    ///
    /// Returns `TransferError::MalformedParams` for an invalid URL or method,
    /// a file part without name or source, a file type that is not a valid
    /// header value, or an invalid header.
    pub fn validate(&self) -> Result<(Url, reqwest::Method)> {
        let url = validate_url(&self.to_url)?;
        let method = reqwest::Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                TransferError::MalformedParams(format!("invalid method '{}'", self.method).into())
            })?;
        for file in &self.files {
            if file.filepath.trim().is_empty() {
                return Err(TransferError::malformed("upload file has no source"));
            }
            if !self.sends_raw_body() && file.name.is_empty() {
                return Err(TransferError::malformed("upload file has no field name"));
            }
            if let Some(filetype) = &file.filetype {
                reqwest::header::HeaderValue::from_str(filetype).map_err(|_| {
                    TransferError::MalformedParams(
                        format!("invalid content type for file part '{}'", file.name).into(),
                    )
                })?;
            }
        }
        validate_headers(&self.headers)?;
        Ok((url, method))
    }
}

/// Parameters of either direction
#[derive(Debug, Clone)]
pub enum TransferParams {
    /// Download job
    Download(DownloadParams),
    /// Upload job
    Upload(UploadParams),
}

impl TransferParams {
    /// Job id chosen by the caller
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Download(p) => p.job_id,
            Self::Upload(p) => p.job_id,
        }
    }

    /// Transfer direction
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Self::Download(_) => Direction::Download,
            Self::Upload(_) => Direction::Upload,
        }
    }

    /// Validate the direction-specific parameters
    ///
    /// # Errors
    ///
    /// Returns `TransferError::MalformedParams` on the first invalid field.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Download(p) => p.validate().map(|_| ()),
            Self::Upload(p) => p.validate().map(|_| ()),
        }
    }
}

impl From<DownloadParams> for TransferParams {
    fn from(params: DownloadParams) -> Self {
        Self::Download(params)
    }
}

impl From<UploadParams> for TransferParams {
    fn from(params: UploadParams) -> Self {
        Self::Upload(params)
    }
}
