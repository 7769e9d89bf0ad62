use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::booking::BookingStatus;
use crate::models::matching::{ExhaustReason, JobOffer, OfferResponse};
use crate::models::provider::GeoPoint;

/// One position sample from the realtime feed. Both the push stream and the
/// snapshot refetch produce these; reconciliation is by `server_timestamp`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub provider_id: Uuid,
    pub location: GeoPoint,
    pub server_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Subscribed,
    Stale,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackEvent {
    Position {
        location: GeoPoint,
        distance_km: f64,
        eta_minutes: f64,
        server_timestamp: DateTime<Utc>,
    },
    ArrivalReached,
    ConnectionChanged { state: ConnectionState },
}

/// Everything the engine announces to the outside world, streamed over the
/// websocket endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    OfferIssued {
        offer: JobOffer,
    },
    OfferResolved {
        offer_id: Uuid,
        provider_id: Uuid,
        response: OfferResponse,
    },
    OfferTimedOut {
        offer_id: Uuid,
        provider_id: Uuid,
    },
    OfferRetracted {
        offer_id: Uuid,
        provider_id: Uuid,
    },
    DispatchConfirmed {
        request_id: Uuid,
        provider_id: Uuid,
        booking_id: Uuid,
    },
    DispatchExhausted {
        request_id: Uuid,
        reason: ExhaustReason,
    },
    DispatchAbandoned {
        request_id: Uuid,
    },
    BookingTransition {
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    },
    Track {
        booking_id: Uuid,
        event: TrackEvent,
    },
}
