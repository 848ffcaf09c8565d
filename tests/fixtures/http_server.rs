//! In-process HTTP fixture server
//!
//! An axum app on an ephemeral loopback port that answers every request
//! with a single [`Route`]:
//! - stream a generated body at a controlled pace, optionally stalling
//! - accept a request and never answer
//! - capture request bodies and answer
//!
//! # Example
//!
//! ```no_run
//! use skiff_integration_tests::fixtures::{HttpFixture, Route};
//!
//! # async fn demo() -> std::io::Result<()> {
//! let server = HttpFixture::start(Route::stream(1024)).await?;
//! let url = server.url("/file.bin");
//! // ... run a download against `url` ...
//! # Ok(())
//! # }
//! ```

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Deterministic body content: byte `i` is `i % 251`
#[must_use]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A loopback port with nothing listening on it
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Behaviour of the fixture for every request
#[derive(Debug, Clone)]
pub enum Route {
    /// Respond with a generated body of `len` bytes
    Stream {
        /// Response status
        status: u16,
        /// Body length
        len: usize,
        /// Bytes per body frame
        chunk: usize,
        /// Pause between frames
        delay: Duration,
        /// Advertise `Content-Length` (otherwise chunked encoding)
        content_length: bool,
        /// Stop sending (keeping the connection open) after this many bytes
        stall_after: Option<usize>,
    },
    /// Accept the request, then never answer
    Stall,
    /// Read the full request body and answer with `body`
    Capture {
        /// Response status
        status: u16,
        /// Response body
        body: String,
        /// Pause for every 16 KiB read from the request body
        pace: Duration,
    },
}

impl Route {
    /// 200 response of `len` bytes with `Content-Length`, sent as fast as possible
    #[must_use]
    pub fn stream(len: usize) -> Self {
        Self::Stream {
            status: 200,
            len,
            chunk: 64 * 1024,
            delay: Duration::ZERO,
            content_length: true,
            stall_after: None,
        }
    }

    /// 200 response of `len` bytes, `chunk` bytes every `delay`
    #[must_use]
    pub fn paced(len: usize, chunk: usize, delay: Duration) -> Self {
        Self::Stream {
            status: 200,
            len,
            chunk,
            delay,
            content_length: true,
            stall_after: None,
        }
    }

    /// Answer uploads with 200 and `body`
    #[must_use]
    pub fn capture(body: &str) -> Self {
        Self::Capture {
            status: 200,
            body: body.to_string(),
            pace: Duration::ZERO,
        }
    }

    /// Like [`Route::capture`], reading the request body slowly
    #[must_use]
    pub fn slow_capture(body: &str, pace: Duration) -> Self {
        Self::Capture {
            status: 200,
            body: body.to_string(),
            pace,
        }
    }
}

/// A request as seen by the fixture
#[derive(Debug, Clone, Default)]
pub struct CapturedRequest {
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Header lines in arrival order
    pub headers: Vec<(String, String)>,
    /// Decoded body
    pub body: Vec<u8>,
    /// True if the body arrived complete
    pub complete: bool,
}

impl CapturedRequest {
    /// First value of a header, case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone)]
struct FixtureState {
    route: Route,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FixtureState {
    /// Record a request, returning its index
    fn record(&self, request: CapturedRequest) -> usize {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        requests.len() - 1
    }
}

/// Running fixture server; stops accepting when dropped
pub struct HttpFixture {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    task: JoinHandle<()>,
}

impl HttpFixture {
    /// Bind an ephemeral loopback port and start serving `route`
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(route: Route) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = FixtureState {
            route,
            requests: Arc::clone(&requests),
        };
        let app = Router::new().fallback(handle).with_state(state);
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::debug!("Fixture server stopped: {}", e);
            }
        });

        Ok(Self {
            addr,
            requests,
            task,
        })
    }

    /// Listening address
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for `path`
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for HttpFixture {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    State(state): State<FixtureState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request = CapturedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: Vec::new(),
        complete: false,
    };

    match state.route.clone() {
        Route::Stream {
            status,
            len,
            chunk,
            delay,
            content_length,
            stall_after,
        } => {
            state.record(request);
            let mut response = Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header("x-fixture", "stream");
            // Without an explicit length hyper falls back to chunked encoding
            if content_length {
                response = response.header(header::CONTENT_LENGTH, len);
            }
            response
                .body(Body::from_stream(generated_body(len, chunk, delay, stall_after)))
                .unwrap()
        }
        Route::Stall => {
            state.record(request);
            std::future::pending().await
        }
        Route::Capture {
            status,
            body: reply,
            pace,
        } => {
            let index = state.record(request);
            let (data, complete) = read_body(body, pace).await;
            {
                let mut requests = state.requests.lock().unwrap();
                requests[index].body = data;
                requests[index].complete = complete;
            }
            if !complete {
                return StatusCode::BAD_REQUEST.into_response();
            }

            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "text/plain")
                .header("x-upload-id", "42")
                .body(Body::from(reply))
                .unwrap()
        }
    }
}

fn generated_body(
    len: usize,
    chunk: usize,
    delay: Duration,
    stall_after: Option<usize>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let data = Bytes::from(pattern(len));
    let limit = stall_after.unwrap_or(len).min(len);
    let chunk = chunk.max(1);

    stream::unfold(0usize, move |sent| {
        let data = data.clone();
        async move {
            if sent >= limit {
                if stall_after.is_some() {
                    // Keep the connection open without sending the rest
                    std::future::pending::<()>().await;
                }
                return None;
            }
            if sent > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let end = (sent + chunk).min(limit);
            Some((Ok(data.slice(sent..end)), end))
        }
    })
}

const READ_SLICE: usize = 16 * 1024;

/// Collect a request body, sleeping `pace` per 16 KiB; false if it broke off
async fn read_body(body: Body, pace: Duration) -> (Vec<u8>, bool) {
    let mut frames = body.into_data_stream();
    let mut data = Vec::new();

    while let Some(frame) = frames.next().await {
        let Ok(bytes) = frame else {
            return (data, false);
        };
        data.extend_from_slice(&bytes);
        if !pace.is_zero() {
            let slices = bytes.len().div_ceil(READ_SLICE).max(1);
            tokio::time::sleep(pace * slices as u32).await;
        }
    }
    (data, true)
}
