//! Store-list loading.
//!
//! The store file is JSON lines: one object per line with the store's
//! identity and credentials, typically produced by an external
//! configuration scanner.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// One resolved store entry.
#[derive(Debug, Clone)]
pub struct Store {
    /// Store identifier; the leading DNS label of the store's API host.
    pub store_id: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Where the entry came from, when recorded.
    pub provenance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStore {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    store_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl RawStore {
    fn validate(self) -> Result<Store, &'static str> {
        let store_id = self
            .store_id
            .or(self.id)
            .filter(|id| !id.is_empty())
            .ok_or("missing store id")?;
        let username = self
            .username
            .filter(|name| !name.is_empty())
            .ok_or("missing username")?;
        let password = self
            .password
            .filter(|pass| !pass.is_empty())
            .ok_or("missing password")?;
        Ok(Store {
            store_id,
            username,
            password,
            provenance: self.file,
        })
    }
}

/// Loads the JSON-lines store list.
///
/// Lines that fail to decode or validate are logged and skipped, and
/// duplicate store ids keep the first occurrence, so one bad entry never
/// blocks the rest of the run.
pub fn load(path: &Path) -> std::io::Result<Vec<Store>> {
    let file = File::open(path)?;

    let mut seen = HashSet::new();
    let mut stores = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let raw: RawStore = match serde_json::from_str(&line) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("error decoding store entry: {err}");
                continue;
            }
        };
        let store = match raw.validate() {
            Ok(store) => store,
            Err(reason) => {
                warn!("skipping store entry: {reason}");
                continue;
            }
        };

        if !seen.insert(store.store_id.clone()) {
            continue;
        }
        stores.push(store);
    }

    Ok(stores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_text(text: &str) -> Vec<Store> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stores.jsonl");
        std::fs::write(&path, text).unwrap();
        load(&path).unwrap()
    }

    #[test]
    fn loads_valid_entries() {
        let stores = load_text(concat!(
            "{\"store_id\":\"acme\",\"username\":\"u\",\"password\":\"p\",\"file\":\"a.yml\"}\n",
            "{\"store_id\":\"blue\",\"username\":\"u2\",\"password\":\"p2\"}\n",
        ));

        assert_eq!(stores.len(), 2);
        assert_eq!(stores[0].store_id, "acme");
        assert_eq!(stores[0].provenance.as_deref(), Some("a.yml"));
        assert_eq!(stores[1].store_id, "blue");
    }

    #[test]
    fn id_is_a_fallback_for_store_id() {
        let stores = load_text("{\"id\":\"acme\",\"username\":\"u\",\"password\":\"p\"}\n");
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].store_id, "acme");
    }

    #[test]
    fn invalid_json_lines_are_skipped() {
        let stores = load_text(concat!(
            "not json\n",
            "{\"store_id\":\"acme\",\"username\":\"u\",\"password\":\"p\"}\n",
        ));
        assert_eq!(stores.len(), 1);
    }

    #[test]
    fn entries_missing_credentials_are_skipped() {
        let stores = load_text(concat!(
            "{\"store_id\":\"acme\",\"username\":\"u\"}\n",
            "{\"store_id\":\"blue\",\"password\":\"p\"}\n",
            "{\"username\":\"u\",\"password\":\"p\"}\n",
        ));
        assert!(stores.is_empty());
    }

    #[test]
    fn duplicate_store_ids_keep_the_first_entry() {
        let stores = load_text(concat!(
            "{\"store_id\":\"acme\",\"username\":\"first\",\"password\":\"p\"}\n",
            "{\"store_id\":\"acme\",\"username\":\"second\",\"password\":\"p\"}\n",
        ));
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].username, "first");
    }

    #[test]
    fn blank_lines_are_tolerated() {
        let stores = load_text("\n{\"store_id\":\"acme\",\"username\":\"u\",\"password\":\"p\"}\n\n");
        assert_eq!(stores.len(), 1);
    }
}
