//! Photos attached to handovers, reports and trips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kind::{Entity, EntityKind};

/// A captured photo. Image bytes travel base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub owner_kind: EntityKind,
    pub owner_id: String,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
    #[serde(with = "super::base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub synced_to_server: bool,
}

impl Photo {
    /// Owner key stored in the `by_owner` index, e.g. `handover:h1`.
    #[must_use]
    pub fn owner_key(kind: EntityKind, owner_id: &str) -> String {
        format!("{kind}:{owner_id}")
    }
}

impl Entity for Photo {
    const KIND: EntityKind = EntityKind::Photo;

    fn id(&self) -> &str {
        &self.id
    }

    fn synced_to_server(&self) -> bool {
        self.synced_to_server
    }

    fn set_synced_to_server(&mut self, synced: bool) {
        self.synced_to_server = synced;
    }

    fn index_value(&self, column: &str) -> Option<String> {
        match column {
            "owner" => Some(Self::owner_key(self.owner_kind, &self.owner_id)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_is_base64() {
        let photo = Photo {
            id: "p1".to_string(),
            owner_kind: EntityKind::Handover,
            owner_id: "h1".to_string(),
            mime_type: "image/jpeg".to_string(),
            captured_at: Utc::now(),
            data: vec![0xff, 0xd8, 0xff],
            synced_to_server: false,
        };

        let json = serde_json::to_value(&photo).unwrap();
        assert_eq!(json["data"], "/9j/");
        assert_eq!(json["ownerKind"], "handover");

        let back: Photo = serde_json::from_value(json).unwrap();
        assert_eq!(back.data, vec![0xff, 0xd8, 0xff]);
        assert_eq!(back.index_value("owner").as_deref(), Some("handover:h1"));
    }
}
