//! Filters for list and count requests.

use chrono::{DateTime, Utc};

/// General list options usable against most collections.
///
/// All fields are optional; only set fields are sent. These apply to the
/// first request of a pagination stream only; continuation requests take
/// their parameters wholly from the server-provided cursor link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Opaque pagination continuation token.
    pub page_info: Option<String>,
    /// Page size.
    pub limit: Option<u32>,
    /// Only records with an id greater than this.
    pub since_id: Option<i64>,
    /// Lower bound on `created_at`.
    pub created_at_min: Option<DateTime<Utc>>,
    /// Upper bound on `created_at`.
    pub created_at_max: Option<DateTime<Utc>>,
    /// Lower bound on `updated_at`.
    pub updated_at_min: Option<DateTime<Utc>>,
    /// Upper bound on `updated_at`.
    pub updated_at_max: Option<DateTime<Utc>>,
    /// Sort order understood by the server.
    pub order: Option<String>,
    /// Comma-separated field projection.
    pub fields: Option<String>,
}

impl ListOptions {
    /// Serializes the set fields as query parameters.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_text(&mut pairs, "page_info", self.page_info.as_deref());
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_owned(), limit.to_string()));
        }
        if let Some(since_id) = self.since_id {
            pairs.push(("since_id".to_owned(), since_id.to_string()));
        }
        push_time(&mut pairs, "created_at_min", self.created_at_min);
        push_time(&mut pairs, "created_at_max", self.created_at_max);
        push_time(&mut pairs, "updated_at_min", self.updated_at_min);
        push_time(&mut pairs, "updated_at_max", self.updated_at_max);
        push_text(&mut pairs, "order", self.order.as_deref());
        push_text(&mut pairs, "fields", self.fields.as_deref());
        pairs
    }
}

fn push_text(pairs: &mut Vec<(String, String)>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        pairs.push((key.to_owned(), value.to_owned()));
    }
}

fn push_time(pairs: &mut Vec<(String, String)>, key: &str, value: Option<DateTime<Utc>>) {
    if let Some(value) = value {
        pairs.push((key.to_owned(), value.to_rfc3339()));
    }
}
