//! Transport agents: the seam between `HttpClient` and the network.
//!
//! # Design
//! An `Agent` issues one request and hands back an `AgentResponse` whose
//! status and headers are available immediately, while the body is pushed
//! chunk by chunk into a `BodyReceiver`. The client never talks to a socket
//! itself, so tests inject a scripted agent instead of patching globals.
//!
//! `ReqwestAgent` is the default. It never follows redirects on its own;
//! that policy belongs to `HttpClient`.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::body::{BodyProducer, BodyReceiver};
use crate::error::FetchError;
use crate::http::{Headers, HttpMethod, ProxyEndpoint};

/// Issues HTTP requests, optionally through a proxy.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn request(
        &self,
        method: &HttpMethod,
        url: &Url,
        headers: &Headers,
        body: Option<BodyProducer>,
    ) -> Result<Box<dyn AgentResponse>, FetchError>;

    /// Proxy every connection is routed through, if any.
    fn proxy_endpoint(&self) -> Option<&ProxyEndpoint> {
        None
    }
}

/// A response whose head has arrived but whose body is still in flight.
#[async_trait]
pub trait AgentResponse: Send {
    fn code(&self) -> u16;

    fn phrase(&self) -> String;

    /// Every header name with all of its values.
    fn all_raw_headers(&self) -> Headers;

    /// Push the body into `receiver` in arrival order, then end the stream
    /// with `connection_lost`.
    async fn deliver_body(self: Box<Self>, receiver: BodyReceiver);
}

/// Default agent backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestAgent {
    client: reqwest::Client,
    proxy: Option<ProxyEndpoint>,
}

impl ReqwestAgent {
    /// Agent that connects to target hosts directly.
    pub fn new() -> Result<Self, FetchError> {
        Self::build(None)
    }

    /// Agent that routes every connection through `proxy`.
    pub fn with_proxy(proxy: ProxyEndpoint) -> Result<Self, FetchError> {
        Self::build(Some(proxy))
    }

    fn build(proxy: Option<ProxyEndpoint>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        builder = match &proxy {
            Some(endpoint) => {
                builder.proxy(reqwest::Proxy::all(endpoint.url()).map_err(FetchError::transport)?)
            }
            None => builder.no_proxy(),
        };
        let client = builder.build().map_err(FetchError::transport)?;
        Ok(Self { client, proxy })
    }
}

#[async_trait]
impl Agent for ReqwestAgent {
    async fn request(
        &self,
        method: &HttpMethod,
        url: &Url,
        headers: &Headers,
        body: Option<BodyProducer>,
    ) -> Result<Box<dyn AgentResponse>, FetchError> {
        let wire_method =
            reqwest::Method::from_bytes(method.as_str().as_bytes()).map_err(FetchError::transport)?;
        let mut request = self.client.request(wire_method, url.clone());
        for (name, values) in headers {
            for value in values {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        if let Some(producer) = body {
            let length = producer.length();
            let mut payload = Vec::with_capacity(length as usize);
            producer.start_producing(&mut payload).await?;
            debug!(%url, length, "attaching request body");
            request = request.body(payload);
        }

        let response = request.send().await.map_err(FetchError::transport)?;
        Ok(Box::new(ReqwestResponse { inner: response }))
    }

    fn proxy_endpoint(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }
}

struct ReqwestResponse {
    inner: reqwest::Response,
}

#[async_trait]
impl AgentResponse for ReqwestResponse {
    fn code(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// hyper only records the phrase when it differs from the canonical one.
    fn phrase(&self) -> String {
        match self.inner.extensions().get::<hyper::ext::ReasonPhrase>() {
            Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
            None => self
                .inner
                .status()
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn all_raw_headers(&self) -> Headers {
        let mut headers = Headers::new();
        for (name, value) in self.inner.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        headers
    }

    async fn deliver_body(self: Box<Self>, mut receiver: BodyReceiver) {
        let mut inner = self.inner;
        loop {
            match inner.chunk().await {
                Ok(Some(chunk)) => receiver.data_received(&chunk),
                Ok(None) => return receiver.connection_lost(Ok(())),
                Err(err) => return receiver.connection_lost(Err(FetchError::transport(err))),
            }
        }
    }
}
