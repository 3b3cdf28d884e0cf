use crate::server::requests::{user_agent, Request, RequestBody};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::Deserialize;
use std::borrow::Cow;

/// Upload endpoint; POSTs the payload and reads back the server-side
/// throughput computation.
pub struct Upload {
    data: Vec<u8>,
}

impl Upload {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Receive-side throughput measurement computed by the server.
///
/// Every field is optional at the wire level; the timed transfer
/// validates what it actually needs.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadMetrics {
    #[serde(rename = "bytesReceived")]
    pub bytes_received: Option<u64>,
    #[serde(rename = "durationMs")]
    pub duration_ms: Option<f64>,
    #[serde(rename = "startTime")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime")]
    pub end_time: Option<i64>,
    #[serde(rename = "bitsPerSecond")]
    pub bits_per_second: Option<f64>,
    pub mbps: Option<f64>,
}

/// Reply body from the upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReply {
    pub status: Option<String>,
    /// Bytes the server actually received.
    pub size: Option<u64>,
    /// Receive duration in seconds, measured server-side.
    pub duration: Option<f64>,
    /// Server-computed throughput in Mbps.
    pub speed: Option<f64>,
    pub metrics: Option<UploadMetrics>,
}

impl Request for Upload {
    type Response = UploadReply;

    const METHOD: Method = Method::POST;

    fn endpoint(&self) -> Cow<'_, str> {
        "api/speedtest/upload".into()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(USER_AGENT, user_agent().parse().unwrap());

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        headers
    }

    fn body(&self) -> RequestBody {
        RequestBody::Bytes(self.data.clone())
    }
}
