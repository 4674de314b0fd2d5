//! Asynchronous HTTP client with optional redirect following.
//!
//! # Design
//! `HttpClient` is configured once through `HttpClientBuilder` and can then
//! `fetch` any number of times; it holds no per-request state. Each fetch
//! issues the request through the configured `Agent`, attaches a
//! `BodyReceiver` to the response and waits for the completion signal
//! before building a `Response`.
//!
//! Redirects are an explicit loop bounded by `max_redirects`. Every hop
//! reissues the original method, headers and payload against the resolved
//! `Location`.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use crate::agent::{Agent, ReqwestAgent};
use crate::body::{BodyProducer, BodyReceiver};
use crate::error::FetchError;
use crate::http::{has_header, Headers, HttpMethod, ProxyEndpoint, Response};

/// Redirect hops followed before giving up with `TooManyRedirects`.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Builder for `HttpClient`.
pub struct HttpClientBuilder {
    url: String,
    method: Option<HttpMethod>,
    headers: Option<Headers>,
    postdata: Option<Bytes>,
    proxy: Option<ProxyEndpoint>,
    follow_redirect: bool,
    max_redirects: usize,
    agent: Option<Arc<dyn Agent>>,
}

impl HttpClientBuilder {
    /// Explicit method. Without one the client uses POST when a non-empty
    /// payload is set and GET otherwise. A non-empty payload also gets a form
    /// `Content-Type` unless one is given, whatever the method.
    pub fn method(mut self, method: impl Into<HttpMethod>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Replace the request headers entirely.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Append one header value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn postdata(mut self, body: impl Into<Bytes>) -> Self {
        self.postdata = Some(body.into());
        self
    }

    /// Route the default `ReqwestAgent` through `proxy`. An agent injected
    /// with `agent` takes precedence and is used as given; `proxy_config`
    /// still reports the endpoint.
    pub fn proxy(mut self, proxy: impl Into<ProxyEndpoint>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn follow_redirect(mut self, follow: bool) -> Self {
        self.follow_redirect = follow;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Use `agent` instead of building a `ReqwestAgent`. A configured proxy
    /// is then the agent's business.
    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn build(self) -> Result<HttpClient, FetchError> {
        let has_payload = self.postdata.as_ref().is_some_and(|body| !body.is_empty());
        let method = self.method.unwrap_or(if has_payload {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        });

        let mut headers = self.headers.unwrap_or_default();
        if has_payload && !has_header(&headers, "Content-Type") {
            headers.insert("Content-Type".to_string(), vec![FORM_CONTENT_TYPE.to_string()]);
        }

        let agent: Arc<dyn Agent> = match self.agent {
            Some(agent) => agent,
            None => match &self.proxy {
                Some(proxy) => Arc::new(ReqwestAgent::with_proxy(proxy.clone())?),
                None => Arc::new(ReqwestAgent::new()?),
            },
        };

        Ok(HttpClient {
            url: self.url,
            method,
            headers,
            postdata: self.postdata,
            proxy: self.proxy,
            follow_redirect: self.follow_redirect,
            max_redirects: self.max_redirects,
            agent,
        })
    }
}

/// HTTP client bound to one target URL.
pub struct HttpClient {
    url: String,
    method: HttpMethod,
    headers: Headers,
    postdata: Option<Bytes>,
    proxy: Option<ProxyEndpoint>,
    follow_redirect: bool,
    max_redirects: usize,
    agent: Arc<dyn Agent>,
}

impl HttpClient {
    pub fn builder(url: impl Into<String>) -> HttpClientBuilder {
        HttpClientBuilder {
            url: url.into(),
            method: None,
            headers: None,
            postdata: None,
            proxy: None,
            follow_redirect: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            agent: None,
        }
    }

    /// Client with every option at its default.
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        Self::builder(url).build()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn postdata(&self) -> Option<&Bytes> {
        self.postdata.as_ref()
    }

    pub fn proxy_config(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }

    pub fn agent(&self) -> &dyn Agent {
        self.agent.as_ref()
    }

    /// Issue the request and wait for the whole body.
    ///
    /// With redirect following enabled, a 301/302/303/307/308 carrying a
    /// `Location` header is chased until a non-redirect response arrives or
    /// `max_redirects` hops have been taken. Otherwise the first response is
    /// returned as is, redirect headers included.
    pub async fn fetch(&self) -> Result<Response, FetchError> {
        let mut url = Url::parse(&self.url)?;
        let mut hops = 0;
        loop {
            let response = self.fetch_once(&url).await?;
            let location = match response.header("location") {
                Some(location) if self.follow_redirect && response.is_redirect() => {
                    location.to_string()
                }
                _ => return Ok(response),
            };

            if hops == self.max_redirects {
                warn!(%url, max = self.max_redirects, "redirect limit reached");
                return Err(FetchError::TooManyRedirects {
                    max: self.max_redirects,
                    url: url.to_string(),
                });
            }
            hops += 1;

            let next = url.join(&location)?;
            info!(from = %url, to = %next, hop = hops, code = response.code, "following redirect");
            url = next;
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Response, FetchError> {
        let producer = self
            .postdata
            .as_ref()
            .filter(|body| !body.is_empty())
            .map(|body| BodyProducer::new(body.clone()));

        debug!(method = %self.method, %url, "issuing request");
        let pending = self
            .agent
            .request(&self.method, url, &self.headers, producer)
            .await?;

        let code = pending.code();
        let phrase = pending.phrase();
        let headers = pending.all_raw_headers();

        let (finished, done) = oneshot::channel();
        pending.deliver_body(BodyReceiver::new(finished)).await;
        let body = done.await.map_err(|_| FetchError::BodyAbandoned)??;
        debug!(code, length = body.len(), "response body complete");

        Ok(Response {
            code,
            phrase,
            headers,
            body,
        })
    }
}

/// Fetch `url` with a default client.
pub async fn fetch(url: &str) -> Result<Response, FetchError> {
    HttpClient::new(url)?.fetch().await
}
