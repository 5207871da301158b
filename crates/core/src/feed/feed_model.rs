//! Feed domain models.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the current version of an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Delivered by the server through a push subscription.
    #[default]
    Confirmed,
    /// Applied locally by an optimistic write, not yet confirmed.
    Pending,
    /// An optimistic write the server refused.
    Rejected,
}

/// Denormalized author fields resolved by the enrichment batcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub id: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

/// A single item of a partitioned feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Stable identity, constant across optimistic and confirmed versions
    pub id: String,
    pub partition: String,
    /// Causal-order key
    pub created_at: DateTime<Utc>,
    pub payload: Value,
    #[serde(default)]
    pub provenance: Provenance,
    /// Foreign key resolved by the enrichment batcher
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author: Option<AuthorProfile>,
}

impl Entry {
    /// Creates a confirmed entry with no author reference.
    pub fn new(
        id: impl Into<String>,
        partition: impl Into<String>,
        created_at: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            partition: partition.into(),
            created_at,
            payload,
            provenance: Provenance::Confirmed,
            author_id: None,
            author: None,
        }
    }

    pub fn with_author_id(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.provenance == Provenance::Pending
    }
}

/// Snapshot ordering: newest first, ties broken by ascending identity.
pub fn causal_order(a: &Entry, b: &Entry) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// A set of changes delivered by a push subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch {
    /// Added or modified entries, in delivery order
    pub upserts: Vec<Entry>,
    /// Identities deleted on the server
    #[serde(default)]
    pub removed_ids: Vec<String>,
}

impl ChangeBatch {
    pub fn upserts(upserts: Vec<Entry>) -> Self {
        Self {
            upserts,
            removed_ids: Vec::new(),
        }
    }

    pub fn removals(removed_ids: Vec<String>) -> Self {
        Self {
            upserts: Vec::new(),
            removed_ids,
        }
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.removed_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removed_ids.is_empty()
    }
}

/// An immutable, fully merged and sorted view of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub partition: String,
    /// Increases by one with every publication for the partition
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
}

impl FeedSnapshot {
    /// The snapshot of a partition that has never been published.
    pub fn empty(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            version: 0,
            published_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Message delivered by a push subscription.
#[derive(Debug, Clone)]
pub enum Delivery {
    Batch(ChangeBatch),
    /// The stream failed; no further deliveries follow.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_causal_order_newest_first() {
        let older = Entry::new("a", "prayer", at(1), json!({}));
        let newer = Entry::new("b", "prayer", at(2), json!({}));
        assert_eq!(causal_order(&newer, &older), Ordering::Less);
        assert_eq!(causal_order(&older, &newer), Ordering::Greater);
    }

    #[test]
    fn test_causal_order_ties_break_by_identity() {
        let a = Entry::new("a", "prayer", at(1), json!({}));
        let b = Entry::new("b", "prayer", at(1), json!({}));
        assert_eq!(causal_order(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_entry_json_defaults_to_confirmed() {
        let entry: Entry = serde_json::from_value(json!({
            "id": "p1",
            "partition": "prayer",
            "createdAt": "2024-01-01T00:00:00Z",
            "payload": {"text": "hello"}
        }))
        .unwrap();
        assert_eq!(entry.provenance, Provenance::Confirmed);
        assert!(entry.author_id.is_none());
    }
}
