//! Typed requests for the speed-test server endpoints.

pub mod download;
pub mod ip;
pub mod ping;
pub mod upload;

use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::Method;
use serde::Deserialize;
use std::borrow::Cow;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) fn user_agent() -> String {
    format!("{}/{}", NAME, VERSION)
}

/// Body attached to a request.
pub enum RequestBody {
    None,
    Bytes(Vec<u8>),
}

/// One server endpoint: method, path, headers, body, and the shape of
/// the JSON reply.
pub trait Request {
    type Response: for<'de> Deserialize<'de>;

    const METHOD: Method = Method::GET;

    fn endpoint(&self) -> Cow<'_, str>;

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(USER_AGENT, user_agent().parse().unwrap());

        headers
    }

    fn body(&self) -> RequestBody {
        RequestBody::None
    }
}

impl<R: Request> Request for &R {
    type Response = R::Response;

    const METHOD: Method = R::METHOD;

    fn endpoint(&self) -> Cow<'_, str> {
        (**self).endpoint()
    }

    fn headers(&self) -> HeaderMap {
        (**self).headers()
    }

    fn body(&self) -> RequestBody {
        (**self).body()
    }
}
