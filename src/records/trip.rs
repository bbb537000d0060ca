//! Vehicle trips and the GPS points recorded along them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kind::{Entity, EntityKind};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Lifecycle state of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    /// Trip is being tracked
    #[default]
    Active,
    /// Driver ended the trip
    Completed,
    /// Trip was abandoned before completion
    Cancelled,
}

impl TripStatus {
    /// Stored index value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A single GPS fix produced by the location tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported accuracy radius in meters
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationPoint {
    /// Great-circle distance to another point, in kilometers.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// A driver's trip with a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub driver_id: String,
    pub vehicle_id: String,
    #[serde(default)]
    pub status: TripStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_odometer_km: Option<f64>,
    #[serde(default)]
    pub end_odometer_km: Option<f64>,
    #[serde(default)]
    pub route: Vec<LocationPoint>,
    #[serde(default)]
    pub synced_to_server: bool,
}

impl Trip {
    /// Start a new active trip.
    #[must_use]
    pub fn start(id: impl Into<String>, driver_id: impl Into<String>, vehicle_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            driver_id: driver_id.into(),
            vehicle_id: vehicle_id.into(),
            status: TripStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
            start_odometer_km: None,
            end_odometer_km: None,
            route: Vec::new(),
            synced_to_server: false,
        }
    }

    /// Mark the trip completed.
    pub fn finish(&mut self, end_odometer_km: Option<f64>) {
        self.status = TripStatus::Completed;
        self.ended_at = Some(Utc::now());
        self.end_odometer_km = end_odometer_km;
    }

    /// Distance covered along the recorded route.
    #[must_use]
    pub fn route_distance_km(&self) -> f64 {
        self.route
            .windows(2)
            .map(|pair| pair[0].distance_km(&pair[1]))
            .sum()
    }
}

impl Entity for Trip {
    const KIND: EntityKind = EntityKind::Trip;

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
