//! Queue item types for the sync queue.
//!
//! Defines the pending mutations that are drained against the remote endpoint.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FieldSyncError;
use crate::records::{Entity, EntityKind};

/// Mutation carried by a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Record was created locally
    Create,
    /// Record was edited locally
    Update,
    /// Record was deleted by the user
    Delete,
}

impl SyncAction {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse from the wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Action an open item ends up with when a newer mutation for the same
    /// record is enqueued on top of it.
    ///
    /// A record the server has never seen must still be created, so a
    /// pending `create` absorbs later updates. Anything else takes the newer
    /// action.
    #[must_use]
    pub const fn merge(self, newer: Self) -> Self {
        match (self, newer) {
            (Self::Create, Self::Update) => Self::Create,
            (_, newer) => newer,
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pending mutation awaiting remote acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Caller-supplied unique ID
    pub id: String,
    /// Collection of the affected record
    pub entity_type: EntityKind,
    /// ID of the affected record; at most one open item exists per record
    pub record_id: String,
    pub action: SyncAction,
    /// Opaque payload forwarded to the remote endpoint
    #[serde(with = "crate::records::base64_bytes")]
    pub payload: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
    /// Failed remote attempts so far
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set once the retry policy gives up on the item
    pub dead_letter: bool,
    /// Bumped every time a newer mutation is merged into this item
    pub revision: i64,
}

impl SyncQueueItem {
    /// Create a new item enqueued now.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        entity_type: EntityKind,
        record_id: impl Into<String>,
        action: SyncAction,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type,
            record_id: record_id.into(),
            action,
            payload,
            enqueued_at: now(),
            retry_count: 0,
            last_error: None,
            last_attempt_at: None,
            dead_letter: false,
            revision: 0,
        }
    }

    /// Create an item carrying the JSON form of a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn for_record<E: Entity>(record: &E, action: SyncAction) -> Result<Self, FieldSyncError> {
        let payload = serde_json::to_vec(record)?;
        let enqueued_at = now();
        Ok(Self {
            enqueued_at,
            ..Self::new(
                generated_id(E::KIND, record.id(), enqueued_at),
                E::KIND,
                record.id(),
                action,
                payload,
            )
        })
    }

    /// Create a delete item for a record.
    #[must_use]
    pub fn deletion(entity_type: EntityKind, record_id: &str) -> Self {
        let enqueued_at = now();
        let payload = serde_json::json!({ "id": record_id }).to_string().into_bytes();
        Self {
            enqueued_at,
            ..Self::new(
                generated_id(entity_type, record_id, enqueued_at),
                entity_type,
                record_id,
                SyncAction::Delete,
                payload,
            )
        }
    }

    /// Override the enqueue timestamp.
    #[must_use]
    pub fn with_enqueued_at(mut self, enqueued_at: DateTime<Utc>) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    /// Payload parsed as JSON, if it is JSON.
    #[must_use]
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

/// Timestamp format used for every stored queue timestamp.
///
/// Fixed precision with a `Z` suffix keeps lexical order equal to time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision timestamps are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn generated_id(kind: EntityKind, record_id: &str, at: DateTime<Utc>) -> String {
    format!("{kind}:{record_id}:{}", at.timestamp_micros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FuelEntry;

    #[test]
    fn test_merge_actions() {
        assert_eq!(SyncAction::Create.merge(SyncAction::Update), SyncAction::Create);
        assert_eq!(SyncAction::Create.merge(SyncAction::Delete), SyncAction::Delete);
        assert_eq!(SyncAction::Update.merge(SyncAction::Update), SyncAction::Update);
        assert_eq!(SyncAction::Delete.merge(SyncAction::Create), SyncAction::Create);
    }

    #[test]
    fn test_for_record() {
        let entry = FuelEntry::new("f1", "v1", 30.0, 1.8);
        let item = SyncQueueItem::for_record(&entry, SyncAction::Create).unwrap();

        assert_eq!(item.entity_type, EntityKind::Fuel);
        assert_eq!(item.record_id, "f1");
        assert!(item.id.starts_with("fuel:f1:"));
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.payload_json().unwrap()["vehicleId"], "v1");
    }

    #[test]
    fn test_deletion_payload() {
        let item = SyncQueueItem::deletion(EntityKind::Trip, "t9");
        assert_eq!(item.action, SyncAction::Delete);
        assert_eq!(item.payload_json().unwrap()["id"], "t9");
    }

    #[test]
    fn test_timestamp_format_sorts_lexically() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T09:59:59.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(format_timestamp(late), "2024-01-01T10:00:00.000000Z");
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(SyncAction::parse("UPDATE"), Some(SyncAction::Update));
        assert_eq!(SyncAction::parse("upsert"), None);
    }
}
