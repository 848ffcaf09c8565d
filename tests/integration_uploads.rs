//! Upload scenarios against the in-process HTTP fixture.

use skiff_core::events::ChannelSink;
use skiff_core::{JobController, JobState, TransferError, TransferEvent, UploadFile, UploadParams};
use skiff_integration_tests::fixtures::{HttpFixture, Route, pattern};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn controller() -> (JobController, UnboundedReceiver<TransferEvent>) {
    let (sink, rx) = ChannelSink::new();
    (JobController::new(Arc::new(sink)), rx)
}

fn drain(rx: &mut UnboundedReceiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn source(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Upload that reports begin and progress events
fn observed(job_id: i32, url: impl Into<String>) -> UploadParams {
    UploadParams::new(job_id, url).events(true, true)
}

/// Stop upload `job_id` as soon as its first progress event arrives
async fn stop_on_first_progress(
    controller: &JobController,
    rx: &mut UnboundedReceiver<TransferEvent>,
    job_id: i32,
) {
    let stopped = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            if event.job_id() == job_id && event.is_progress() {
                return controller.stop_upload(job_id);
            }
        }
        false
    })
    .await
    .expect("no progress event within 10 s");
    assert!(stopped);
}

#[tokio::test]
async fn test_multipart_field_and_file() {
    let server = HttpFixture::start(Route::capture("stored")).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "a.txt", b"AB");
    let (controller, mut rx) = controller();

    let params = observed(1, server.url("/upload"))
        .field("note", "1")
        .file(
            UploadFile::new("file", source(&file))
                .filename("a.txt")
                .filetype("text/plain"),
        );
    let result = controller.upload(params).unwrap().await;

    assert_eq!(result.state, JobState::Completed);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.body.as_deref(), Some("stored"));
    let headers = result.headers.as_ref().unwrap();
    assert_eq!(headers.get("X-Upload-Id"), Some("42"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert!(request.complete);

    let content_type = request.header("content-type").unwrap();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .expect("multipart content type");
    let expected = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"note\"\r\n\r\n\
         1\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         AB\r\n\
         --{boundary}--\r\n"
    );
    assert_eq!(String::from_utf8_lossy(&request.body), expected);
    assert_eq!(
        request.header("content-length"),
        Some(expected.len().to_string().as_str())
    );
    assert_eq!(result.bytes_transferred, expected.len() as u64);

    let events = drain(&mut rx);
    assert_eq!(events[0], TransferEvent::UploadBegin { job_id: 1 });
    match events.last() {
        Some(TransferEvent::UploadProgress {
            total_bytes_expected_to_send,
            total_bytes_sent,
            ..
        }) => {
            assert_eq!(*total_bytes_expected_to_send, Some(expected.len() as u64));
            assert_eq!(*total_bytes_sent, expected.len() as u64);
        }
        other => panic!("expected UploadProgress last, got {other:?}"),
    }

    let payload = result.to_payload();
    assert_eq!(payload["jobId"], 1);
    assert_eq!(payload["body"], "stored");
}

#[tokio::test]
async fn test_multipart_orders_fields_before_files() {
    let server = HttpFixture::start(Route::capture("ok")).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let first = write_file(dir.path(), "one.bin", b"111");
    let second = write_file(dir.path(), "two.bin", b"222");
    let (controller, _rx) = controller();

    // Files are added before fields; fields still come first on the wire
    let params = UploadParams::new(2, server.url("/multi"))
        .file(UploadFile::new("first", source(&first)))
        .file(UploadFile::new("second", source(&second)))
        .field("a", "x")
        .field("b", "y");
    assert!(controller.upload(params).unwrap().await.is_success());

    let body = String::from_utf8(server.requests()[0].body.clone()).unwrap();
    let at = |needle: &str| body.find(needle).unwrap_or_else(|| panic!("{needle} missing"));
    assert!(at("name=\"a\"") < at("name=\"b\""));
    assert!(at("name=\"b\"") < at("name=\"first\""));
    assert!(at("name=\"first\"") < at("name=\"second\""));
    // Filenames default to the source's name, types to octet-stream
    assert!(body.contains("filename=\"one.bin\"\r\nContent-Type: application/octet-stream"));
    assert!(body.contains("\r\n\r\n222\r\n"));
}

#[tokio::test]
async fn test_binary_upload_sends_raw_bytes() {
    let server = HttpFixture::start(Route::capture("")).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let contents = pattern(1024 * 1024);
    let file = write_file(dir.path(), "raw.bin", &contents);
    let (controller, mut rx) = controller();

    let params = observed(3, server.url("/raw"))
        .method("put")
        .binary_stream_only(true)
        .progress(Duration::from_secs(3600), 4)
        .file(UploadFile::new("", source(&file)));
    let result = controller.upload(params).unwrap().await;
    assert!(result.is_success());
    assert_eq!(result.bytes_transferred, contents.len() as u64);

    let request = &server.requests()[0];
    assert_eq!(request.method, "PUT");
    assert_eq!(request.header("content-type"), Some("application/octet-stream"));
    assert!(request.body == contents);

    let progress: Vec<u64> = drain(&mut rx)
        .iter()
        .filter_map(TransferEvent::progress_bytes)
        .collect();
    assert!((4..=5).contains(&progress.len()), "{progress:?}");
    assert_eq!(progress.last().copied(), Some(contents.len() as u64));
}

#[tokio::test]
async fn test_binary_upload_keeps_caller_content_type() {
    let server = HttpFixture::start(Route::capture("")).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "doc.json", b"{}");
    let (controller, _rx) = controller();

    let params = UploadParams::new(4, server.url("/json"))
        .binary_stream_only(true)
        .header("Content-Type", "application/json")
        .file(UploadFile::new("doc", source(&file)).filetype("text/plain"));
    assert!(controller.upload(params).unwrap().await.is_success());

    let request = &server.requests()[0];
    let content_types: Vec<_> = request
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .collect();
    assert_eq!(content_types.len(), 1);
    assert_eq!(content_types[0].1, "application/json");
    assert_eq!(request.body, b"{}");
}

#[tokio::test]
async fn test_missing_upload_file_fails_before_sending() {
    let server = HttpFixture::start(Route::capture("")).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let present = write_file(dir.path(), "here.txt", b"x");
    let missing = dir.path().join("gone.txt");
    let (controller, mut rx) = controller();

    let params = observed(5, server.url("/u"))
        .file(UploadFile::new("a", source(&present)))
        .file(UploadFile::new("b", source(&missing)));
    let result = controller.upload(params).unwrap().await;

    assert_eq!(result.state, JobState::Failed);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.code(), "ENOENT");
    assert!(error.to_string().contains("gone.txt"));
    assert!(server.requests().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_directory_upload_source_fails() {
    let server = HttpFixture::start(Route::capture("")).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (controller, _rx) = controller();

    let params = UploadParams::new(6, server.url("/u"))
        .file(UploadFile::new("dir", source(dir.path())));
    let result = controller.upload(params).unwrap().await;

    assert!(matches!(result.error, Some(TransferError::IsDirectory(_))));
    assert_eq!(result.to_payload()["code"], "EISDIR");
}

#[tokio::test]
async fn test_upload_stop_is_reported_as_cancelled() {
    let server = HttpFixture::start(Route::slow_capture("", Duration::from_millis(1)))
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "big.bin", &pattern(16 * 1024 * 1024));
    let (controller, mut rx) = controller();

    let completion = controller
        .upload(
            observed(7, server.url("/big"))
                .binary_stream_only(true)
                .file(UploadFile::new("big", source(&file))),
        )
        .unwrap();

    stop_on_first_progress(&controller, &mut rx, 7).await;
    let result = completion.await;

    // The aborted request surfaces as an I/O error; the stop request wins
    assert_eq!(result.state, JobState::Cancelled, "{:?}", result.error);
    assert_eq!(result.error, Some(TransferError::Cancelled));
    assert!(result.bytes_transferred < 16 * 1024 * 1024);
    assert!(!controller.is_active(7));
}

#[tokio::test]
async fn test_upload_read_timeout() {
    let server = HttpFixture::start(Route::Stall).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "small.txt", b"hello");
    let (controller, _rx) = controller();

    let params = UploadParams::new(8, server.url("/stall"))
        .timeouts(Duration::from_secs(5), Duration::from_millis(200))
        .file(UploadFile::new("f", source(&file)));
    let result = controller.upload(params).unwrap().await;

    assert_eq!(result.state, JobState::Failed);
    assert!(
        matches!(result.error, Some(TransferError::NetworkTimeout(_))),
        "{:?}",
        result.error
    );
}

#[tokio::test]
async fn test_stop_while_awaiting_response_is_prompt() {
    let server = HttpFixture::start(Route::Stall).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "small.txt", b"hello");
    let (controller, mut rx) = controller();

    // The body is tiny; the job then waits on a server that never answers
    let completion = controller
        .upload(
            observed(10, server.url("/stall"))
                .timeouts(Duration::from_secs(5), Duration::from_secs(60))
                .file(UploadFile::new("f", source(&file))),
        )
        .unwrap();
    stop_on_first_progress(&controller, &mut rx, 10).await;

    let result = tokio::time::timeout(Duration::from_secs(5), completion)
        .await
        .expect("stop should not wait for the read timeout");
    assert_eq!(result.state, JobState::Cancelled);
    assert_eq!(result.error, Some(TransferError::Cancelled));
}

#[tokio::test]
async fn test_filetype_with_line_break_rejected() {
    let (controller, _rx) = controller();
    let err = controller
        .upload(
            UploadParams::new(11, "http://localhost/u")
                .file(UploadFile::new("f", "/tmp/f").filetype("text/plain\r\nX-Evil: 1")),
        )
        .unwrap_err();
    assert!(matches!(err, TransferError::MalformedParams(_)));
    assert!(!controller.is_active(11));
}

#[tokio::test]
async fn test_invalid_method_rejected() {
    let (controller, _rx) = controller();
    let err = controller
        .upload(UploadParams::new(9, "http://localhost/u").method("BAD METHOD"))
        .unwrap_err();
    assert!(matches!(err, TransferError::MalformedParams(_)));
    assert!(!controller.is_active(9));
}
