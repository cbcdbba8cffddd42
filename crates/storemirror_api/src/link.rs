//! Pagination cursor extraction from `Link` response headers.

use crate::error::{ApiError, ApiResult};
use reqwest::header::{HeaderMap, LINK};
use reqwest::Url;

/// Extracts the `next` relation's target from a response's `Link` headers.
///
/// An absent header, or one with no `next` relation, means the sequence is
/// complete. A `next` target that is not a valid URL is a decoding failure
/// carrying the header bytes.
pub(crate) fn next_page_url(headers: &HeaderMap) -> ApiResult<Option<Url>> {
    for value in headers.get_all(LINK) {
        let Ok(text) = value.to_str() else {
            continue;
        };
        for segment in text.split(',') {
            let Some(target) = next_target(segment) else {
                continue;
            };
            let url = Url::parse(target).map_err(|err| ApiError::Decoding {
                reason: format!("invalid next link: {err}"),
                raw: value.as_bytes().to_vec(),
            })?;
            return Ok(Some(url));
        }
    }
    Ok(None)
}

/// Returns the target of one `<url>; rel=next` segment, if that is what it is.
fn next_target(segment: &str) -> Option<&str> {
    let mut parts = segment.split(';');
    let target = parts
        .next()?
        .trim()
        .strip_prefix('<')?
        .strip_suffix('>')?;

    let is_next = parts.any(|param| {
        param
            .trim()
            .strip_prefix("rel=")
            .map(|rel| rel.trim_matches('"') == "next")
            .unwrap_or(false)
    });
    is_next.then_some(target)
}
