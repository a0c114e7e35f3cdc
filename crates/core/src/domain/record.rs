// Scraped record identity and deduplication
//
// A record is an opaque JSON object. Its identity is a digest over
// (url, headline[, published_date]); records are appended once per identity
// and never removed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::error::{DomainError, Result};

pub const HASH_ID_FIELD: &str = "hash_id";
pub const STATUS_FIELD: &str = "status";
pub const STATUS_HISTORY_FIELD: &str = "status_history";

/// Number of hex characters kept from the SHA-256 digest
const HASH_ID_LEN: usize = 16;

/// Deterministic identity for a record
pub fn hash_id(url: &str, headline: &str, published_date: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(headline.trim().as_bytes());
    if let Some(date) = published_date.map(str::trim).filter(|d| !d.is_empty()) {
        hasher.update(b"|");
        hasher.update(date.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..HASH_ID_LEN].to_string()
}

/// Identity of a record object, computed from its fields
///
/// `headline` falls back to `title` since several sites only expose the latter.
pub fn identity_of(record: &Map<String, Value>) -> Result<String> {
    let url = record.get("url").and_then(Value::as_str);
    let headline = record
        .get("headline")
        .or_else(|| record.get("title"))
        .and_then(Value::as_str);

    match (url, headline) {
        (Some(url), Some(headline)) if !url.trim().is_empty() => Ok(hash_id(
            url,
            headline,
            record.get("published_date").and_then(Value::as_str),
        )),
        _ => Err(DomainError::MissingIdentity),
    }
}

/// Counters returned by [`RecordSet::merge`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Ordered, hash-indexed collection of records
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<Value>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from previously persisted records
    ///
    /// Earlier entries win when the persisted array already holds duplicates.
    pub fn from_records(records: Vec<Value>) -> Self {
        let mut set = Self::new();
        for record in records {
            let key = match record.as_object() {
                Some(obj) => existing_key(obj),
                None => None,
            };
            match key {
                Some(key) if set.index.contains_key(&key) => {}
                Some(key) => {
                    set.index.insert(key, set.records.len());
                    set.records.push(record);
                }
                // Keep unidentifiable legacy rows rather than silently dropping data
                None => set.records.push(record),
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, hash_id: &str) -> bool {
        self.index.contains_key(hash_id)
    }

    pub fn get(&self, hash_id: &str) -> Option<&Value> {
        self.index.get(hash_id).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Value> {
        self.records
    }

    /// Merge freshly scraped records
    ///
    /// New identities are appended. A known identity whose `status` changed
    /// has the previous status pushed onto `status_history`. Anything else is
    /// a duplicate and leaves the set untouched.
    pub fn merge(&mut self, incoming: Vec<Value>, now: DateTime<Utc>) -> MergeStats {
        let mut stats = MergeStats::default();

        for record in incoming {
            let Value::Object(mut obj) = record else {
                stats.rejected += 1;
                continue;
            };

            let key = match existing_key(&obj) {
                Some(key) => key,
                None => match identity_of(&obj) {
                    Ok(key) => {
                        obj.insert(HASH_ID_FIELD.to_string(), Value::String(key.clone()));
                        key
                    }
                    Err(_) => {
                        stats.rejected += 1;
                        continue;
                    }
                },
            };

            match self.index.get(&key) {
                Some(&i) => {
                    if apply_status_change(&mut self.records[i], &obj, now) {
                        stats.updated += 1;
                    } else {
                        stats.duplicates += 1;
                    }
                }
                None => {
                    self.index.insert(key, self.records.len());
                    self.records.push(Value::Object(obj));
                    stats.added += 1;
                }
            }
        }

        stats
    }
}

fn existing_key(obj: &Map<String, Value>) -> Option<String> {
    obj.get(HASH_ID_FIELD)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Returns true when the stored record's status was replaced
fn apply_status_change(stored: &mut Value, incoming: &Map<String, Value>, now: DateTime<Utc>) -> bool {
    let Some(new_status) = incoming.get(STATUS_FIELD).and_then(Value::as_str) else {
        return false;
    };
    let Some(stored) = stored.as_object_mut() else {
        return false;
    };

    let previous = stored
        .get(STATUS_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);
    if previous.as_deref() == Some(new_status) {
        return false;
    }

    if let Some(previous) = previous {
        let entry = serde_json::json!({
            "status": previous,
            "changed_at": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        match stored.get_mut(STATUS_HISTORY_FIELD) {
            Some(Value::Array(history)) => history.push(entry),
            _ => {
                stored.insert(STATUS_HISTORY_FIELD.to_string(), Value::Array(vec![entry]));
            }
        }
    }
    stored.insert(STATUS_FIELD.to_string(), Value::String(new_status.to_string()));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_hash_id_stable() {
        let a = hash_id("https://apra.gov.au/news/1", "APRA releases", Some("2025-01-02"));
        let b = hash_id(" https://apra.gov.au/news/1 ", "APRA releases ", Some("2025-01-02"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_id_date_matters() {
        let with_date = hash_id("u", "h", Some("2025-01-02"));
        let without = hash_id("u", "h", None);
        let empty = hash_id("u", "h", Some(""));
        assert_ne!(with_date, without);
        assert_eq!(without, empty);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![
            json!({"url": "https://a/1", "headline": "One", "published_date": "2025-01-01"}),
            json!({"url": "https://a/2", "headline": "Two"}),
        ];

        let mut set = RecordSet::new();
        let first = set.merge(batch.clone(), now());
        assert_eq!(first.added, 2);

        let second = set.merge(batch, now());
        assert_eq!(second.added, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_merge_assigns_hash_id() {
        let mut set = RecordSet::new();
        set.merge(vec![json!({"url": "https://a/1", "title": "Titled"})], now());

        let expected = hash_id("https://a/1", "Titled", None);
        let stored = set.get(&expected).unwrap();
        assert_eq!(stored[HASH_ID_FIELD], expected.as_str());
    }

    #[test]
    fn test_merge_rejects_unidentifiable() {
        let mut set = RecordSet::new();
        let stats = set.merge(vec![json!({"headline": "no url"}), json!("string")], now());
        assert_eq!(stats.rejected, 2);
        assert!(set.is_empty());
    }

    #[test]
    fn test_status_change_tracked() {
        let mut set = RecordSet::new();
        let open = json!({"url": "https://apra/c1", "headline": "Consultation", "status": "Open"});
        set.merge(vec![open], now());

        let closed = json!({"url": "https://apra/c1", "headline": "Consultation", "status": "Closed"});
        let stats = set.merge(vec![closed.clone()], now());
        assert_eq!(stats.updated, 1);

        let key = hash_id("https://apra/c1", "Consultation", None);
        let stored = set.get(&key).unwrap();
        assert_eq!(stored["status"], "Closed");
        assert_eq!(stored["status_history"][0]["status"], "Open");
        assert_eq!(stored["status_history"][0]["changed_at"], "2025-03-01T10:00:00Z");

        // Same status again is a plain duplicate
        let stats = set.merge(vec![closed], now());
        assert_eq!(stats.duplicates, 1);
        assert_eq!(set.get(&key).unwrap()["status_history"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_from_records_drops_persisted_duplicates() {
        let set = RecordSet::from_records(vec![
            json!({"hash_id": "abc", "headline": "first"}),
            json!({"hash_id": "abc", "headline": "second"}),
            json!({"legacy": true}),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("abc").unwrap()["headline"], "first");
    }
}
