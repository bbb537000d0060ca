//! Fuel purchases logged by drivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kind::{Entity, EntityKind};

/// A single fuel purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelEntry {
    pub id: String,
    pub vehicle_id: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    pub liters: f64,
    pub price_per_liter: f64,
    #[serde(default)]
    pub odometer_km: Option<f64>,
    #[serde(default)]
    pub station: Option<String>,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub synced_to_server: bool,
}

impl FuelEntry {
    /// Create an unsynced fuel entry recorded now.
    #[must_use]
    pub fn new(id: impl Into<String>, vehicle_id: impl Into<String>, liters: f64, price_per_liter: f64) -> Self {
        Self {
            id: id.into(),
            vehicle_id: vehicle_id.into(),
            trip_id: None,
            liters,
            price_per_liter,
            odometer_km: None,
            station: None,
            recorded_at: Utc::now(),
            synced_to_server: false,
        }
    }

    /// Total cost of the purchase.
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.liters * self.price_per_liter
    }
}

impl Entity for FuelEntry {
    const KIND: EntityKind = EntityKind::Fuel;

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
            "trip_id" => self.trip_id.clone(),
            _ => None,
        }
    }
}
