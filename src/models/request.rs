use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::pricing::Voucher;
use crate::models::provider::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceItem {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub duration_minutes: u32,
}

/// One customer matching request. `origin` and `radius_km` are fixed for the
/// lifetime of a dispatch session; a retry creates a new request that may
/// only widen `excluded_providers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub origin: GeoPoint,
    pub radius_km: f64,
    pub price_ceiling: Decimal,
    pub excluded_providers: HashSet<Uuid>,
    pub services: Vec<ServiceItem>,
    pub voucher: Option<Voucher>,
    pub credit_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn subtotal(&self) -> Decimal {
        self.services.iter().map(|s| s.price).sum()
    }
}
