//! Vehicle handovers between drivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kind::{Entity, EntityKind};

/// Acceptance state of a handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandoverStatus {
    /// Waiting for the receiving driver
    #[default]
    Pending,
    /// Receiving driver signed off
    Accepted,
    /// Receiving driver reported a discrepancy
    Disputed,
}

impl HandoverStatus {
    /// Stored index value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Disputed => "disputed",
        }
    }
}

/// A handover of a vehicle from one driver to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handover {
    pub id: String,
    pub vehicle_id: String,
    pub from_driver: String,
    pub to_driver: String,
    #[serde(default)]
    pub odometer_km: Option<f64>,
    /// Tank level, 0-100
    #[serde(default)]
    pub fuel_level_percent: Option<u8>,
    #[serde(default)]
    pub damage_notes: Option<String>,
    #[serde(default)]
    pub status: HandoverStatus,
    pub handed_over_at: DateTime<Utc>,
    #[serde(default)]
    pub synced_to_server: bool,
}

impl Handover {
    /// Record the receiving driver's decision.
    pub fn resolve(&mut self, accepted: bool, damage_notes: Option<String>) {
        self.status = if accepted {
            HandoverStatus::Accepted
        } else {
            HandoverStatus::Disputed
        };
        if damage_notes.is_some() {
            self.damage_notes = damage_notes;
        }
    }
}

impl Entity for Handover {
    const KIND: EntityKind = EntityKind::Handover;

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
            "vehicle_id" => Some(self.vehicle_id.clone()),
            "status" => Some(self.status.as_str().to_string()),
            _ => None,
        }
    }
}
