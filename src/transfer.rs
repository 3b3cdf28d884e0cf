//! Timed transfers: one download, upload, or ping exercise producing a
//! single speed or latency sample.
//!
//! Downloads are timed client-side across the full body stream. Upload
//! throughput is adopted from the server's receive-side computation,
//! because client-side wall clock would fold connection setup and server
//! processing into the transfer time.

use std::fmt;
use std::time::Duration;

use futures::StreamExt;
use log::debug;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::EngineError;
use crate::server::requests::download::Download;
use crate::server::requests::ping::Ping;
use crate::server::requests::upload::{Upload, UploadReply};
use crate::server::Client;

/// Binary-mega convention: 1 Mbps = 1,048,576 bits/second, applied
/// consistently across upload, download, and every consumer downstream.
pub const BITS_PER_MEGABIT: f64 = 1_048_576.0;

/// Which exercise produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Download,
    Upload,
    Ping,
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Download => write!(f, "download"),
            SampleKind::Upload => write!(f, "upload"),
            SampleKind::Ping => write!(f, "ping"),
        }
    }
}

/// A single measurement, immutable once recorded. `value` is Mbps for
/// transfers and milliseconds for pings.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub value: f64,
    pub timestamp: Instant,
    pub kind: SampleKind,
}

/// Throughput in Mbps for `bytes` moved over `duration`.
///
/// Rejects zero byte counts and non-positive durations so a clock
/// anomaly or empty body can never turn into a NaN or infinite sample.
pub fn mbps(bytes: u64, duration: Duration) -> Result<f64, EngineError> {
    if bytes == 0 {
        return Err(EngineError::InvalidMeasurement(
            "zero bytes transferred".into(),
        ));
    }

    let secs = duration.as_secs_f64();
    if secs <= 0.0 {
        return Err(EngineError::InvalidMeasurement(
            "non-positive transfer duration".into(),
        ));
    }

    Ok((bytes as f64 * 8.0) / secs / BITS_PER_MEGABIT)
}

/// Download the endpoint's body once, streaming, and time it.
///
/// The clock starts before the request is issued and stops after the
/// last chunk is drained, so the sample covers the whole transfer
/// without ever buffering the body.
pub async fn single_download_test(
    client: &Client,
    cancel: &CancellationToken,
) -> Result<Sample, EngineError> {
    let start = Instant::now();

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(EngineError::Transfer("download aborted".into()));
        }
        response = client.fetch(Download) => response?,
    };

    let mut stream = response.bytes_stream();
    let mut bytes_received: u64 = 0;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(EngineError::Transfer(
                    "download aborted mid-stream".into(),
                ));
            }
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(chunk)) => bytes_received += chunk.len() as u64,
            Some(Err(e)) => return Err(e.into()),
            None => break,
        }
    }

    let duration = start.elapsed();
    let value = mbps(bytes_received, duration)?;
    debug!(
        "download: {} bytes in {:?} -> {:.2} Mbps",
        bytes_received, duration, value
    );

    Ok(Sample { value, timestamp: Instant::now(), kind: SampleKind::Download })
}

/// POST the payload once and adopt the server's receive-side throughput.
pub async fn single_upload_test(
    client: &Client,
    payload: &[u8],
    cancel: &CancellationToken,
) -> Result<Sample, EngineError> {
    let request = Upload::new(payload.to_vec());
    let bytes = request.bytes();

    let reply = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(EngineError::Transfer("upload aborted".into()));
        }
        reply = client.send(request) => reply?,
    };

    let value = upload_speed_from_reply(&reply)?;
    debug!("upload: {} bytes -> {:.2} Mbps (server-side)", bytes, value);

    Ok(Sample { value, timestamp: Instant::now(), kind: SampleKind::Upload })
}

/// Extract the authoritative Mbps figure from an upload reply.
pub(crate) fn upload_speed_from_reply(
    reply: &UploadReply,
) -> Result<f64, EngineError> {
    let metrics = reply.metrics.as_ref().ok_or_else(|| {
        EngineError::InvalidServerResponse("reply carries no metrics".into())
    })?;

    match metrics.mbps {
        Some(value) if value.is_finite() && value >= 0.0 => Ok(value),
        Some(_) => Err(EngineError::InvalidServerResponse(
            "metrics.mbps is not a finite speed".into(),
        )),
        None => Err(EngineError::InvalidServerResponse(
            "metrics.mbps is missing".into(),
        )),
    }
}

/// Round trip the ping endpoint once; the sample value is the RTT in
/// milliseconds from request issuance to response receipt.
pub async fn single_ping_test(
    client: &Client,
    cancel: &CancellationToken,
) -> Result<Sample, EngineError> {
    let start = Instant::now();

    let reply = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(EngineError::Transfer("ping aborted".into()));
        }
        reply = client.send(Ping) => reply?,
    };

    let rtt_ms = start.elapsed().as_secs_f64() * 1000.0;
    debug!("ping: {:.2} ms (server status {})", rtt_ms, reply.status);

    Ok(Sample { value: rtt_ms, timestamp: Instant::now(), kind: SampleKind::Ping })
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn five_mebibytes_in_one_second_is_forty_mbps() {
        let value = mbps(5 * 1024 * 1024, Duration::from_secs(1)).unwrap();
        assert!((value - 40.0).abs() < 1e-9);
    }

    #[test]
    fn zero_bytes_is_invalid() {
        let err = mbps(0, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMeasurement(_)));
    }

    #[test]
    fn zero_duration_is_invalid() {
        let err = mbps(1024, Duration::ZERO).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMeasurement(_)));
    }

    #[test]
    fn mbps_is_always_finite_and_non_negative() {
        for bytes in [1u64, 1024, 5 * 1024 * 1024] {
            for millis in [1u64, 10, 1000, 60_000] {
                let value =
                    mbps(bytes, Duration::from_millis(millis)).unwrap();
                assert!(value.is_finite());
                assert!(value >= 0.0);
            }
        }
    }

    #[test]
    fn upload_reply_with_full_metrics_is_adopted_verbatim() {
        let reply: UploadReply = serde_json::from_str(
            r#"{
                "status": "ok",
                "size": 1048576,
                "duration": 0.5,
                "speed": 16.0,
                "metrics": {
                    "bytesReceived": 1048576,
                    "durationMs": 500.0,
                    "startTime": 1700000000000,
                    "endTime": 1700000000500,
                    "bitsPerSecond": 16777216.0,
                    "mbps": 16.0
                }
            }"#,
        )
        .unwrap();

        assert!((upload_speed_from_reply(&reply).unwrap() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn upload_reply_without_mbps_is_rejected() {
        let reply: UploadReply = serde_json::from_str(
            r#"{
                "status": "ok",
                "size": 1048576,
                "duration": 0.5,
                "speed": 16.0,
                "metrics": { "bytesReceived": 1048576 }
            }"#,
        )
        .unwrap();

        let err = upload_speed_from_reply(&reply).unwrap_err();
        assert!(matches!(err, EngineError::InvalidServerResponse(_)));
    }

    #[test]
    fn upload_reply_without_metrics_is_rejected() {
        let reply: UploadReply =
            serde_json::from_str(r#"{ "status": "ok" }"#).unwrap();

        let err = upload_speed_from_reply(&reply).unwrap_err();
        assert!(matches!(err, EngineError::InvalidServerResponse(_)));
    }

    #[tokio::test]
    async fn cancelled_token_resolves_immediately() {
        // TEST-NET address; the biased select must bail out before any
        // connection attempt happens.
        let client =
            Client::new(Url::parse("http://192.0.2.1:9/").unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Instant::now();
        let result = single_download_test(&client, &cancel).await;
        assert!(matches!(result, Err(EngineError::Transfer(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
