use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::provider::Provider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance_score: f64,
    pub rating_score: f64,
    pub experience_score: f64,
}

/// A provider snapshot plus its computed rank inputs. Working state of one
/// matching attempt; discarded after selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub provider: Provider,
    pub distance_km: f64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub attempt_id: Uuid,
    pub primary: Uuid,
    pub backups: Vec<Uuid>,
    pub ranked: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOffer {
    pub offer_id: Uuid,
    pub request_id: Uuid,
    pub provider_id: Uuid,
    /// 0 is the primary candidate, 1.. are backups in rank order.
    pub position: usize,
    pub offered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferResponse {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustReason {
    /// The pool and scorer produced nobody to offer to.
    NoCandidates,
    /// Every offered candidate rejected or timed out.
    AllDeclined,
    /// The directory failed twice in a row; distinct from "nobody nearby".
    DirectoryUnreachable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchPhase {
    Queued,
    Searching,
    Offering { position: usize, provider_id: Uuid },
    Confirmed { provider_id: Uuid, booking_id: Uuid },
    Exhausted { reason: ExhaustReason },
    Abandoned,
}

impl DispatchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchPhase::Confirmed { .. } | DispatchPhase::Exhausted { .. } | DispatchPhase::Abandoned
        )
    }
}

/// Progress of one dispatch session as surfaced over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub phase: DispatchPhase,
    /// Providers that rejected or timed out during this session. A retry
    /// request folds these into its exclusion set.
    pub rejected_providers: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
