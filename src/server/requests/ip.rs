use crate::server::requests::Request;
use serde::Deserialize;
use std::borrow::Cow;

/// Best-effort network identity lookup. Any field may be absent and
/// absence is never fatal to a run.
#[derive(Copy, Clone)]
pub struct IpInfo;

/// Reply body from the IP/geolocation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpInfoReply {
    pub ip: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub isp: Option<String>,
}

impl Request for IpInfo {
    type Response = IpInfoReply;

    fn endpoint(&self) -> Cow<'_, str> {
        "api/ip".into()
    }
}
