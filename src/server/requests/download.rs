use crate::server::requests::{user_agent, Request};
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA, USER_AGENT};
use serde::Deserialize;
use std::borrow::Cow;

/// Download endpoint; the server streams a body of its configured size.
/// The body is consumed incrementally by the timed transfer, never
/// through `Response::json`.
#[derive(Copy, Clone)]
pub struct Download;

/// Placeholder reply type; the download body is raw bytes and is read
/// as a stream, so this deserialization path is never exercised.
#[derive(Debug, Deserialize)]
pub struct NoReply {}

impl Request for Download {
    type Response = NoReply;

    fn endpoint(&self) -> Cow<'_, str> {
        "api/speedtest/download".into()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(USER_AGENT, user_agent().parse().unwrap());

        // Intermediary caches would turn the measurement into a cache
        // benchmark.
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        headers
    }
}
