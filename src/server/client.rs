use crate::errors::EngineError;
use crate::server::requests::{Request, RequestBody};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use url::Url;

/// HTTP client bound to one speed-test server.
#[derive(Debug, Clone)]
pub struct Client {
    client: ReqwestClient,
    base_url: Url,
}

impl Client {
    pub fn new(base_url: Url) -> Self {
        Client { client: ReqwestClient::new(), base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Issue the request and return the status-checked response with the
    /// body untouched, for endpoints that are read as a byte stream.
    pub async fn fetch<R: Request>(
        &self,
        request: R,
    ) -> Result<Response, EngineError> {
        let endpoint = request.endpoint();
        let url = self
            .base_url
            .join(endpoint.trim_matches('/'))
            .map_err(|e| EngineError::Transfer(e.to_string()))?;

        let response = self
            .client
            .request(R::METHOD, url)
            .headers(request.headers())
            .probe_body(request.body())
            .send()
            .await?
            .error_for_status()?;

        Ok(response)
    }

    /// Issue the request and deserialize the JSON reply.
    pub async fn send<R: Request>(
        &self,
        request: R,
    ) -> Result<R::Response, EngineError> {
        let response = self.fetch(request).await?;

        let deserialized = response.json::<R::Response>().await?;

        Ok(deserialized)
    }
}

trait RequestBuilderExt: Sized {
    fn probe_body(self, body: RequestBody) -> Self;
}

impl RequestBuilderExt for RequestBuilder {
    fn probe_body(self, body: RequestBody) -> Self {
        match body {
            RequestBody::None => self,
            RequestBody::Bytes(value) => self.body(value),
        }
    }
}
