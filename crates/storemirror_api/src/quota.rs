//! Rate-limit bucket state reported by the API per response.

use crate::error::{ApiError, ApiResult};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Header carrying the `{used}/{capacity}` call-limit pair.
pub const CALL_LIMIT_HEADER: &str = "x-shopify-shop-api-call-limit";

/// One store's rate-limit bucket as of the latest response.
///
/// Rebuilt from each response's headers and never persisted. Scoped per
/// client, so quota state is never shared across stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaSnapshot {
    /// Requests consumed from the current bucket.
    pub requests_used: u32,
    /// Total bucket capacity.
    pub bucket_capacity: u32,
    /// Server-requested wait before the next request.
    pub retry_after: Duration,
}

impl QuotaSnapshot {
    /// Folds one response's rate-limit headers into the snapshot.
    ///
    /// A missing call-limit header keeps the prior values. A malformed
    /// numeric value in either header is a decoding failure.
    pub fn update(&mut self, headers: &HeaderMap) -> ApiResult<()> {
        if let Some(value) = headers.get(CALL_LIMIT_HEADER) {
            let text = value
                .to_str()
                .map_err(|err| decode_error(err.to_string(), value.as_bytes()))?;
            let parts: Vec<&str> = text.split('/').collect();
            if parts.len() == 2 {
                self.requests_used = parts[0].parse().map_err(|_| {
                    decode_error(
                        format!("call-limit request count is not an integer: {:?}", parts[0]),
                        value.as_bytes(),
                    )
                })?;
                self.bucket_capacity = parts[1].parse().map_err(|_| {
                    decode_error(
                        format!("call-limit bucket size is not an integer: {:?}", parts[1]),
                        value.as_bytes(),
                    )
                })?;
            }
        }

        self.retry_after = parse_retry_after(headers)?;
        Ok(())
    }
}

/// Parses the `Retry-After` header as (possibly fractional) seconds.
///
/// A missing header means no wait was requested.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> ApiResult<Duration> {
    let Some(value) = headers.get(RETRY_AFTER) else {
        return Ok(Duration::ZERO);
    };
    let text = value
        .to_str()
        .map_err(|err| decode_error(err.to_string(), value.as_bytes()))?;
    let seconds: f64 = text.parse().map_err(|_| {
        decode_error(
            format!("Retry-After is not a number: {text:?}"),
            value.as_bytes(),
        )
    })?;
    Duration::try_from_secs_f64(seconds).map_err(|err| decode_error(err.to_string(), value.as_bytes()))
}

fn decode_error(reason: String, raw: &[u8]) -> ApiError {
    ApiError::Decoding {
        reason,
        raw: raw.to_vec(),
    }
}
