//! HTTP transport abstraction.
//!
//! The paging client needs exactly one HTTP verb. Abstracting it behind a
//! trait keeps the client independent of the HTTP library and lets tests
//! script responses without sockets.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// The minimal HTTP surface the paging client needs.
///
/// [`ReqwestTransport`] is the production implementation; [`MockTransport`]
/// serves scripted responses for tests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Executes a GET and returns the materialized response.
    ///
    /// The error string describes a network-level failure; HTTP-level
    /// failures come back as responses and are classified by the caller.
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        (**self).get(request).await
    }
}

/// A fully-resolved request about to hit the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Target URL, query string included.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Basic credentials, present only when the target host is trusted
    /// with them.
    pub basic_auth: Option<(String, String)>,
}

/// A materialized response: status, headers and the full body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header, builder style.
    ///
    /// # Panics
    ///
    /// Panics when the name or value is not a valid header. Intended for
    /// fixtures with known-good inputs.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
        self
    }

    /// Sets the body, builder style.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport with the given per-request timeout.
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mut builder = self.inner.get(request.url).headers(request.headers);
        if let Some((username, password)) = request.basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = builder.send().await.map_err(|err| err.to_string())?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| err.to_string())?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Scripted transport for tests.
///
/// Responses are served in push order; every request is captured for
/// assertions. Running out of scripted responses fails the request.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a network-level failure.
    pub fn push_error(&self, error: impl Into<String>) {
        self.responses.lock().push_back(Err(error.into()));
    }

    /// The requests observed so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response".into()))
    }
}
