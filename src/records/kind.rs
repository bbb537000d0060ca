//! Entity kinds, collection schema and the [`Entity`] trait.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Column mirroring `syncedToServer` in every record table.
pub const SYNC_COLUMN: &str = "synced_to_server";

/// One of the five domain entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A tracked vehicle trip
    Trip,
    /// A fuel purchase
    Fuel,
    /// A camera crew report
    Report,
    /// A vehicle handover between drivers
    Handover,
    /// A photo attached to another record
    Photo,
}

/// A secondary index declared on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    /// Name used by callers, e.g. `by_vehicle`.
    pub name: &'static str,
    /// Backing column in the collection table.
    pub column: &'static str,
}

const fn index(name: &'static str, column: &'static str) -> IndexDef {
    IndexDef { name, column }
}

const BY_SYNC: IndexDef = index("by_sync", SYNC_COLUMN);

const TRIP_INDEXES: &[IndexDef] = &[
    index("by_vehicle", "vehicle_id"),
    index("by_status", "status"),
    BY_SYNC,
];
const FUEL_INDEXES: &[IndexDef] = &[
    index("by_trip", "trip_id"),
    index("by_vehicle", "vehicle_id"),
    BY_SYNC,
];
const REPORT_INDEXES: &[IndexDef] = &[
    index("by_trip", "trip_id"),
    index("by_status", "status"),
    BY_SYNC,
];
const HANDOVER_INDEXES: &[IndexDef] = &[
    index("by_vehicle", "vehicle_id"),
    index("by_status", "status"),
    BY_SYNC,
];
const PHOTO_INDEXES: &[IndexDef] = &[index("by_owner", "owner"), BY_SYNC];

impl EntityKind {
    /// All kinds, in schema order.
    pub const ALL: [Self; 5] = [
        Self::Trip,
        Self::Fuel,
        Self::Report,
        Self::Handover,
        Self::Photo,
    ];

    /// Wire name used in the queue and by the remote endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trip => "trip",
            Self::Fuel => "fuel",
            Self::Report => "report",
            Self::Handover => "handover",
            Self::Photo => "photo",
        }
    }

    /// Parse a kind from its wire name or a common alias.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trip" | "trips" => Some(Self::Trip),
            "fuel" | "fuel-entry" | "fuel_entry" | "fuelentries" => Some(Self::Fuel),
            "report" | "camera-report" | "camera_report" => Some(Self::Report),
            "handover" | "handovers" => Some(Self::Handover),
            "photo" | "photos" => Some(Self::Photo),
            _ => None,
        }
    }

    /// Get the display name for this kind.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Trip => "Trip",
            Self::Fuel => "Fuel Entry",
            Self::Report => "Camera Report",
            Self::Handover => "Handover",
            Self::Photo => "Photo",
        }
    }

    /// Backing table name.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Trip => "trips",
            Self::Fuel => "fuel_entries",
            Self::Report => "camera_reports",
            Self::Handover => "handovers",
            Self::Photo => "photos",
        }
    }

    /// Secondary indexes declared for this collection.
    #[must_use]
    pub const fn indexes(&self) -> &'static [IndexDef] {
        match self {
            Self::Trip => TRIP_INDEXES,
            Self::Fuel => FUEL_INDEXES,
            Self::Report => REPORT_INDEXES,
            Self::Handover => HANDOVER_INDEXES,
            Self::Photo => PHOTO_INDEXES,
        }
    }

    /// Look up a declared index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<IndexDef> {
        self.indexes().iter().copied().find(|def| def.name == name)
    }

    /// Index columns other than the sync flag, in declaration order.
    pub(crate) fn value_columns(&self) -> impl Iterator<Item = &'static str> {
        self.indexes()
            .iter()
            .map(|def| def.column)
            .filter(|column| *column != SYNC_COLUMN)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A domain record stored in one of the entity collections.
///
/// Records are persisted as camelCase JSON; the declared index columns are
/// extracted through [`Entity::index_value`] on every write.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send {
    /// Collection this record type lives in.
    const KIND: EntityKind;

    /// Caller-assigned identifier.
    fn id(&self) -> &str;

    /// Whether the remote endpoint has acknowledged the latest version.
    fn synced_to_server(&self) -> bool;

    /// Flip the sync flag.
    fn set_synced_to_server(&mut self, synced: bool);

    /// Value for a declared (non-sync) index column.
    fn index_value(&self, column: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(EntityKind::parse("fuel-entry"), Some(EntityKind::Fuel));
        assert_eq!(EntityKind::parse("TRIP"), Some(EntityKind::Trip));
        assert_eq!(EntityKind::parse("camera_report"), Some(EntityKind::Report));
        assert_eq!(EntityKind::parse("invoice"), None);
    }

    #[test]
    fn test_every_collection_indexes_sync_flag() {
        for kind in EntityKind::ALL {
            assert!(kind.index("by_sync").is_some(), "{kind} lacks by_sync");
        }
    }

    #[test]
    fn test_value_columns_skip_sync() {
        let columns: Vec<_> = EntityKind::Trip.value_columns().collect();
        assert_eq!(columns, vec!["vehicle_id", "status"]);
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&EntityKind::Fuel).unwrap();
        assert_eq!(json, "\"fuel\"");
        let kind: EntityKind = serde_json::from_str("\"handover\"").unwrap();
        assert_eq!(kind, EntityKind::Handover);
    }
}
