//! A single changelog entry.

use crate::error::{ChangelogError, ChangelogResult};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// One changelog entry: the raw serialized object plus the timestamps the
/// pipeline cares about.
///
/// The payload is opaque except for the `created_at` and `updated_at`
/// fields. A record whose `updated_at` is missing or not a parseable
/// RFC3339 string is "unknown-timestamp"; compaction sorts such records
/// after all known-timestamp ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    raw: String,
}

impl Record {
    /// Parses one changelog line.
    ///
    /// The line must be a single JSON object; anything else is a decode
    /// failure. Timestamp fields that are absent or unparseable leave the
    /// corresponding accessor `None`.
    pub fn parse(line: &str) -> ChangelogResult<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|err| ChangelogError::decode(err.to_string(), line.as_bytes()))?;
        Self::from_value(&value)
    }

    /// Builds a record from an already-decoded JSON value.
    ///
    /// The value must be an object; its compact serialization becomes the
    /// on-disk form.
    pub fn from_value(value: &Value) -> ChangelogResult<Self> {
        if !value.is_object() {
            return Err(ChangelogError::decode(
                "record payload is not a JSON object",
                value.to_string().into_bytes(),
            ));
        }

        Ok(Self {
            created_at: timestamp_field(value, "created_at"),
            updated_at: timestamp_field(value, "updated_at"),
            raw: value.to_string(),
        })
    }

    /// The record's `created_at`, when present and parseable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// The record's `updated_at`, when present and parseable.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// The serialized object exactly as it is written to disk, without the
    /// trailing newline.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

fn timestamp_field(value: &Value, field: &str) -> Option<DateTime<Utc>> {
    let text = value.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
