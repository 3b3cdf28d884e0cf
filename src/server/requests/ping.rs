use crate::server::requests::Request;
use serde::Deserialize;
use std::borrow::Cow;

/// Lightweight timestamp endpoint; the round trip is the sample.
#[derive(Copy, Clone)]
pub struct Ping;

/// Reply body from the ping endpoint.
#[derive(Debug, Deserialize)]
pub struct PingReply {
    pub timestamp: i64,
    pub status: String,
}

impl Request for Ping {
    type Response = PingReply;

    fn endpoint(&self) -> Cow<'_, str> {
        "api/speedtest/ping".into()
    }
}
