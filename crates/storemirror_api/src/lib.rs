//! # Storemirror API
//!
//! A rate-limit-aware client for the remote commerce API, built for one
//! job: walking paginated resource collections to completion without
//! tripping over quotas or transient failures.
//!
//! ## Design
//!
//! - One [`Client`] per store. Clones share the transport, the per-store
//!   [`QuotaSnapshot`] and the cancellation token.
//! - Every request runs under the retry engine: 429s wait exactly as long
//!   as the server asks, 5xx and transport failures back off exponentially
//!   with jitter, other 4xx fail immediately.
//! - Pagination follows the `Link` response header's `next` relation; the
//!   stream ends when the server stops supplying one.
//! - The HTTP layer is a trait ([`HttpTransport`]) so tests can script
//!   responses through [`MockTransport`] without sockets.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod client;
mod error;
mod link;
mod options;
mod quota;
mod transport;

pub use cancel::CancelToken;
pub use client::{
    Client, ClientConfig, DEFAULT_API_HOST, DEFAULT_API_VERSION, DEFAULT_HTTP_TIMEOUT,
    DEFAULT_PAGE_LIMIT, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_RETRY_JITTER,
    DEFAULT_USER_AGENT,
};
pub use error::{ApiError, ApiResult, ErrorShape, StatusError};
pub use options::ListOptions;
pub use quota::{QuotaSnapshot, CALL_LIMIT_HEADER};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, MockTransport, ReqwestTransport};
