use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::pricing::PriceBreakdown;
use crate::models::provider::GeoPoint;
use crate::models::request::ServiceItem;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    OnTheWay,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::OnTheWay => "on_the_way",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

/// A confirmed job. Never deleted; only terminalized through the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub request_id: Uuid,
    pub requester_id: Uuid,
    pub provider_id: Uuid,
    pub services: Vec<ServiceItem>,
    /// Where the provider travels to: the requester's origin.
    pub destination: GeoPoint,
    pub price: PriceBreakdown,
    pub status: BookingStatus,
    /// Stage the booking was in when cancelled, for the external charge
    /// policy.
    pub cancelled_from: Option<BookingStatus>,
    /// Loyalty points granted on completion. Set exactly once.
    pub points_awarded: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
