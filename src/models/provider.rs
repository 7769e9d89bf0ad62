use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProviderStatus {
    Available,
    Busy,
    Offline,
}

/// A registered service provider. A snapshot of this record is what the
/// candidate pool hands to the scorer; snapshots are taken fresh per matching
/// attempt and never cached across attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub location: GeoPoint,
    pub rating: f64,
    pub completed_jobs: u32,
    pub cheapest_price: Decimal,
    pub service_radius_km: f64,
    pub status: ProviderStatus,
    pub updated_at: DateTime<Utc>,
}
