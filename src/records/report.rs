//! Camera crew reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kind::{Entity, EntityKind};

/// Review state of a camera report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Draft,
    Submitted,
}

impl ReportStatus {
    /// Stored index value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
        }
    }
}

/// A report filed by a camera crew member for a shoot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraReport {
    pub id: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    pub crew_member: String,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub status: ReportStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub synced_to_server: bool,
}

impl Entity for CameraReport {
    const KIND: EntityKind = EntityKind::Report;

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
            "trip_id" => self.trip_id.clone(),
            "status" => Some(self.status.as_str().to_string()),
            _ => None,
        }
    }
}
