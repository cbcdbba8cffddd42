//! The paginating, rate-limit-aware client.

use crate::cancel::CancelToken;
use crate::error::{ApiError, ApiResult};
use crate::link;
use crate::options::ListOptions;
use crate::quota::QuotaSnapshot;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use base64::Engine;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use storemirror_changelog::Record;
use storemirror_retry::{Decision, RetryPolicy};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default API version segment.
pub const DEFAULT_API_VERSION: &str = "2020-04";

/// Default parent domain store ids are joined onto.
pub const DEFAULT_API_HOST: &str = "myshopify.com";

/// Default per-request timeout. Some requests take a long time.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Default attempt cap per request.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 10;

/// Default base delay for exponential backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Default ceiling for the random jitter added to each backoff delay.
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(100);

/// Default User-Agent header value.
pub const DEFAULT_USER_AGENT: &str = concat!("storemirror/", env!("CARGO_PKG_VERSION"));

/// Page size assumed when the caller did not set one, used only to
/// estimate page counts for logging.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// How many records a pagination stream buffers ahead of its consumer.
const PAGE_CHANNEL_CAPACITY: usize = 1;

/// Connection settings for one store.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Store identifier; becomes the leading DNS label of the API host.
    pub store_id: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// API version segment of request paths.
    pub api_version: String,
    /// Parent domain the store id is joined onto.
    pub api_host: String,
    /// Per-request timeout.
    pub http_timeout: Duration,
    /// Attempt cap per request.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff.
    pub retry_delay: Duration,
    /// Ceiling for the random jitter added to each backoff delay.
    pub retry_jitter: Duration,
    /// User-Agent header value.
    pub user_agent: String,
}

impl ClientConfig {
    /// Creates a configuration with default overrides.
    pub fn new(
        store_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            username: username.into(),
            password: password.into(),
            api_version: DEFAULT_API_VERSION.to_owned(),
            api_host: DEFAULT_API_HOST.to_owned(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            retry_jitter: DEFAULT_RETRY_JITTER,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Sets the API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Sets the parent API domain.
    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = api_host.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Sets the attempt cap per request.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the base backoff delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the jitter ceiling.
    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Sets the User-Agent header value.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

struct ClientInner<T> {
    config: ClientConfig,
    base_url: Url,
    base_headers: HeaderMap,
    transport: T,
    quota: RwLock<QuotaSnapshot>,
    cancel: CancelToken,
}

/// A paginating client for one store.
///
/// Cloning is cheap and shares the transport, the per-store quota snapshot
/// and the cancellation token.
pub struct Client<T> {
    inner: Arc<ClientInner<T>>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Client<ReqwestTransport> {
    /// Builds a client with the production HTTP transport.
    pub fn from_config(config: ClientConfig, cancel: CancelToken) -> ApiResult<Self> {
        let transport = ReqwestTransport::new(config.http_timeout)?;
        Self::new(config, transport, cancel)
    }
}

impl<T: HttpTransport> Client<T> {
    /// Builds a client over an explicit transport.
    pub fn new(config: ClientConfig, transport: T, cancel: CancelToken) -> ApiResult<Self> {
        let base_url = Url::parse(&format!("https://{}.{}", config.store_id, config.api_host))
            .map_err(|err| ApiError::Transport(format!("invalid base URL: {err}")))?;

        let mut base_headers = HeaderMap::new();
        base_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        base_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let agent = HeaderValue::from_str(&config.user_agent).map_err(|_| {
            ApiError::Transport(format!("invalid user agent: {:?}", config.user_agent))
        })?;
        base_headers.insert(USER_AGENT, agent);

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                base_url,
                base_headers,
                transport,
                quota: RwLock::new(QuotaSnapshot::default()),
                cancel,
            }),
        })
    }

    /// The store this client talks to.
    pub fn store_id(&self) -> &str {
        &self.inner.config.store_id
    }

    /// The latest rate-limit snapshot.
    pub fn quota(&self) -> QuotaSnapshot {
        *self.inner.quota.read()
    }

    /// A handle onto this client's cancellation flag.
    pub fn cancel_token(&self) -> CancelToken {
        self.inner.cancel.clone()
    }

    /// Fetches the collection size for `resource` under `options`.
    ///
    /// Diagnostic only: pagination termination never depends on it.
    pub async fn count(&self, resource: &str, options: &ListOptions) -> ApiResult<u64> {
        #[derive(Deserialize)]
        struct CountBody {
            count: u64,
        }

        let url = self.resource_url(&format!("{resource}/count.json"), &options.to_query())?;
        let response = self.execute(url).await?;
        let body: CountBody =
            serde_json::from_slice(&response.body).map_err(|err| ApiError::Decoding {
                reason: err.to_string(),
                raw: response.body.clone(),
            })?;
        Ok(body.count)
    }

    /// Streams every record of `resource`, following the server's
    /// pagination cursor until it stops supplying one.
    ///
    /// `options` applies to the first request only; each continuation
    /// request takes its parameters wholly from the cursor link.
    /// Cancellation ends the stream silently once the in-flight request
    /// completes; no error is emitted for it.
    pub fn paginate(&self, resource: &str, options: ListOptions) -> mpsc::Receiver<ApiResult<Record>>
    where
        T: 'static,
    {
        let (tx, rx) = mpsc::channel(PAGE_CHANNEL_CAPACITY);
        let client = self.clone();
        let resource = resource.to_owned();
        tokio::spawn(async move {
            client.paginate_into(resource, options, tx).await;
        });
        rx
    }

    async fn paginate_into(
        &self,
        resource: String,
        options: ListOptions,
        tx: mpsc::Sender<ApiResult<Record>>,
    ) {
        let expected = match self.count(&resource, &options).await {
            Ok(count) => {
                info!("expecting {count} {resource} records");
                Some(count)
            }
            Err(ApiError::Cancelled) => return,
            Err(err) => {
                warn!("unable to count {resource}: {err}");
                None
            }
        };
        let limit = options.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
        let pages = expected.map(|count| count.div_ceil(u64::from(limit)).max(1));

        let mut query = options.to_query();
        let mut page = 0u64;
        let mut emitted = 0u64;
        loop {
            if self.inner.cancel.is_cancelled() {
                return;
            }
            page += 1;
            match pages {
                Some(total) => info!("fetching {resource} page {page} of {total}"),
                None => info!("fetching {resource} page {page}"),
            }

            let url = match self.resource_url(&format!("{resource}.json"), &query) {
                Ok(url) => url,
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            };
            let response = match self.execute(url).await {
                Ok(response) => response,
                Err(ApiError::Cancelled) => return,
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            };

            let body: Value = match serde_json::from_slice(&response.body) {
                Ok(body) => body,
                Err(err) => {
                    let _ = tx
                        .send(Err(ApiError::Decoding {
                            reason: err.to_string(),
                            raw: response.body.clone(),
                        }))
                        .await;
                    return;
                }
            };

            if let Some(values) = body.get(resource.as_str()).and_then(Value::as_array) {
                for value in values {
                    let record = match Record::from_value(value) {
                        Ok(record) => record,
                        Err(err) => {
                            let _ = tx.send(Err(err.into())).await;
                            return;
                        }
                    };
                    emitted += 1;
                    if tx.send(Ok(record)).await.is_err() {
                        // Consumer is gone; stop producing.
                        return;
                    }
                }
            }

            match link::next_page_url(&response.headers) {
                Ok(Some(next)) => {
                    query = next
                        .query_pairs()
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect();
                    log_page_info(&query);
                }
                Ok(None) => {
                    if let Some(expected) = expected {
                        if expected != emitted {
                            warn!("expected {expected} records but got {emitted}");
                        }
                    }
                    return;
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            }
        }
    }

    /// Executes one request under the retry policy.
    async fn execute(&self, url: Url) -> ApiResult<HttpResponse> {
        let policy = self.retry_policy();
        storemirror_retry::run(&policy, || {
            let request = self.build_request(url.clone());
            async move { self.attempt(request).await }
        })
        .await
        .map_err(ApiError::from_retry)
    }

    /// One attempt: cancellation check, wire round-trip, quota fold,
    /// status classification.
    async fn attempt(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
        if self.inner.cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        debug!(url = %request.url, "GET");
        let response = self
            .inner
            .transport
            .get(request)
            .await
            .map_err(ApiError::Transport)?;
        debug!(status = %response.status, "received response");

        if let Err(err) = self.inner.quota.write().update(&response.headers) {
            warn!("error updating rate limit info: {err}");
        }

        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_response(&response))
        }
    }

    fn retry_policy(&self) -> RetryPolicy<ApiError> {
        let attempts = self.inner.config.retry_attempts;
        let base = self.inner.config.retry_delay;
        let jitter = self.inner.config.retry_jitter;

        RetryPolicy::new()
            .with_max_attempts(attempts)
            .with_decide(move |attempt, error: &ApiError| match error {
                ApiError::Cancelled => Decision::Stop,
                ApiError::RateLimited { retry_after } => {
                    warn!("rate limited; waiting {retry_after:?}");
                    Decision::Retry(*retry_after)
                }
                ApiError::Transport(_) | ApiError::Server(_) => {
                    Decision::Retry(backoff_delay(base, jitter, attempt))
                }
                _ => Decision::Stop,
            })
            .with_on_retry(move |attempt, delay, error: &ApiError| {
                info!("attempt {attempt}/{attempts}: {error}; sleeping {delay:?}");
            })
    }

    fn resource_url(&self, path: &str, query: &[(String, String)]) -> ApiResult<Url> {
        let path = format!("admin/api/{}/{path}", self.inner.config.api_version);
        let mut url = self
            .inner
            .base_url
            .join(&path)
            .map_err(|err| ApiError::Transport(format!("invalid request URL: {err}")))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    fn build_request(&self, url: Url) -> HttpRequest {
        // Credentials stay on the store's own host; anything pointing
        // elsewhere travels unauthenticated.
        let basic_auth = (url.host_str() == self.inner.base_url.host_str()).then(|| {
            (
                self.inner.config.username.clone(),
                self.inner.config.password.clone(),
            )
        });
        HttpRequest {
            url,
            headers: self.inner.base_headers.clone(),
            basic_auth,
        }
    }
}

/// Exponential backoff: the base delay doubles per attempt, plus uniform
/// random jitter up to the configured ceiling.
fn backoff_delay(base: Duration, jitter: Duration, attempt: u32) -> Duration {
    use rand::Rng;

    let delay = base.saturating_mul(1u32 << attempt.min(16));
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
}

/// Logs the decoded continuation token, when one is present. Diagnostic
/// only; a token that fails to decode is never fatal.
fn log_page_info(query: &[(String, String)]) {
    let Some((_, token)) = query.iter().find(|(key, _)| key == "page_info") else {
        return;
    };
    match base64::engine::general_purpose::STANDARD_NO_PAD.decode(token) {
        Ok(decoded) => debug!("next page info: {}", String::from_utf8_lossy(&decoded)),
        Err(err) => warn!("error decoding page info: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use reqwest::StatusCode;

    fn test_config() -> ClientConfig {
        ClientConfig::new("teststore", "user", "secret")
            .with_retry_delay(Duration::from_millis(1))
            .with_retry_jitter(Duration::from_millis(1))
    }

    fn test_client(config: ClientConfig) -> (Client<Arc<MockTransport>>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let client = Client::new(config, Arc::clone(&transport), CancelToken::new()).unwrap();
        (client, transport)
    }

    fn count_response(count: u64) -> HttpResponse {
        HttpResponse::new(StatusCode::OK).with_body(format!("{{\"count\":{count}}}"))
    }

    fn page_response(resource: &str, ids: &[u32], next: Option<&str>) -> HttpResponse {
        let records: Vec<String> = ids.iter().map(|id| format!("{{\"id\":{id}}}")).collect();
        let body = format!("{{\"{resource}\":[{}]}}", records.join(","));
        let mut response = HttpResponse::new(StatusCode::OK).with_body(body);
        if let Some(url) = next {
            response = response.with_header("link", &format!("<{url}>; rel=\"next\""));
        }
        response
    }

    async fn collect(mut rx: mpsc::Receiver<ApiResult<Record>>) -> Vec<ApiResult<Record>> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn paginates_until_the_link_header_stops() {
        let (client, transport) = test_client(test_config());
        let cursor = "https://teststore.myshopify.com/admin/api/2020-04/orders.json?page_info=abc&limit=2";
        transport.push_response(count_response(6));
        transport.push_response(page_response("orders", &[1, 2], Some(cursor)));
        transport.push_response(page_response("orders", &[3, 4], Some(cursor)));
        transport.push_response(page_response("orders", &[5, 6], None));

        let items = collect(client.paginate("orders", ListOptions::default())).await;

        assert_eq!(items.len(), 6);
        for (idx, item) in items.iter().enumerate() {
            let record = item.as_ref().unwrap();
            assert!(record.raw().contains(&format!("\"id\":{}", idx + 1)));
        }

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[0].url.path().ends_with("/orders/count.json"));
        assert!(requests[1].url.path().ends_with("/orders.json"));
        // Continuation query comes wholly from the cursor link.
        assert_eq!(
            requests[2].url.query(),
            Some("page_info=abc&limit=2"),
            "caller options must not leak into continuation requests"
        );
    }

    #[tokio::test]
    async fn missing_link_ends_stream_despite_count_mismatch() {
        let (client, transport) = test_client(test_config());
        transport.push_response(count_response(10));
        transport.push_response(page_response("orders", &[1, 2], None));

        let items = collect(client.paginate("orders", ListOptions::default())).await;

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn count_failure_degrades_to_a_warning() {
        let (client, transport) = test_client(test_config());
        transport.push_response(
            HttpResponse::new(StatusCode::NOT_FOUND).with_body(r#"{"error":"Not Found"}"#),
        );
        transport.push_response(page_response("orders", &[1], None));

        let items = collect(client.paginate("orders", ListOptions::default())).await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[tokio::test]
    async fn rate_limited_request_is_retried_after_the_server_delay() {
        let (client, transport) = test_client(test_config());
        transport.push_response(count_response(1));
        transport.push_response(
            HttpResponse::new(StatusCode::TOO_MANY_REQUESTS).with_header("retry-after", "0.01"),
        );
        transport.push_response(page_response("orders", &[1], None));

        let items = collect(client.paginate("orders", ListOptions::default())).await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (client, transport) = test_client(test_config());
        transport.push_response(count_response(1));
        transport.push_response(
            HttpResponse::new(StatusCode::UNPROCESSABLE_ENTITY)
                .with_body(r#"{"errors":{"title":["too short"]}}"#),
        );

        let items = collect(client.paginate("orders", ListOptions::default())).await;

        assert_eq!(items.len(), 1);
        match items[0].as_ref().unwrap_err() {
            ApiError::Client(detail) => {
                assert_eq!(detail.messages, vec!["title: too short".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // One count request plus exactly one page attempt.
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn server_errors_retry_until_attempts_are_exhausted() {
        let (client, transport) =
            test_client(test_config().with_retry_attempts(3).with_retry_jitter(Duration::ZERO));
        transport.push_response(count_response(1));
        for _ in 0..3 {
            transport.push_response(HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR));
        }

        let items = collect(client.paginate("orders", ListOptions::default())).await;

        assert_eq!(items.len(), 1);
        match items[0].as_ref().unwrap_err() {
            ApiError::Exhausted(retry) => assert_eq!(retry.attempts().len(), 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn transport_failures_are_retried() {
        let (client, transport) = test_client(test_config());
        transport.push_response(count_response(1));
        transport.push_error("connection reset by peer");
        transport.push_response(page_response("orders", &[1], None));

        let items = collect(client.paginate("orders", ListOptions::default())).await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[tokio::test]
    async fn cancelled_stream_ends_silently() {
        let (client, _transport) = test_client(test_config());
        client.cancel_token().cancel();

        let items = collect(client.paginate("orders", ListOptions::default())).await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn malformed_page_body_is_a_decoding_error() {
        let (client, transport) = test_client(test_config());
        transport.push_response(count_response(1));
        transport.push_response(HttpResponse::new(StatusCode::OK).with_body("<html>"));

        let items = collect(client.paginate("orders", ListOptions::default())).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0].as_ref().unwrap_err(),
            ApiError::Decoding { .. }
        ));
    }

    #[tokio::test]
    async fn first_request_carries_caller_options() {
        let (client, transport) = test_client(test_config());
        transport.push_response(count_response(0));
        transport.push_response(page_response("orders", &[], None));

        let options = ListOptions {
            limit: Some(250),
            ..Default::default()
        };
        let _ = collect(client.paginate("orders", options)).await;

        let requests = transport.requests();
        assert_eq!(requests[1].url.query(), Some("limit=250"));
    }

    #[tokio::test]
    async fn quota_snapshot_tracks_the_latest_response() {
        let (client, transport) = test_client(test_config());
        transport.push_response(count_response(0).with_header(crate::CALL_LIMIT_HEADER, "2/40"));
        transport.push_response(page_response("orders", &[], None));

        let _ = collect(client.paginate("orders", ListOptions::default())).await;

        let quota = client.quota();
        assert_eq!(quota.requests_used, 2);
        assert_eq!(quota.bucket_capacity, 40);
    }

    #[tokio::test]
    async fn count_decodes_the_count_body() {
        let (client, transport) = test_client(test_config());
        transport.push_response(count_response(42));

        let count = client.count("orders", &ListOptions::default()).await.unwrap();
        assert_eq!(count, 42);
    }

    #[test]
    fn credentials_attach_only_to_the_store_host() {
        let (client, _transport) = test_client(test_config());

        let own = client
            .build_request(Url::parse("https://teststore.myshopify.com/admin/api/2020-04/orders.json").unwrap());
        assert!(own.basic_auth.is_some());

        let foreign = client
            .build_request(Url::parse("https://elsewhere.example.com/orders.json").unwrap());
        assert!(foreign.basic_auth.is_none());
    }

    #[test]
    fn request_urls_have_the_documented_shape() {
        let (client, _transport) = test_client(test_config());
        let url = client
            .resource_url("orders.json", &[("limit".to_owned(), "250".to_owned())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://teststore.myshopify.com/admin/api/2020-04/orders.json?limit=250"
        );
    }
}
