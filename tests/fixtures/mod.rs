//! Shared test fixtures

pub mod http_server;

pub use http_server::{CapturedRequest, HttpFixture, Route, pattern, unused_port};
