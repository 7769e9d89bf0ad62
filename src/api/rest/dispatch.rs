use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::engine::queue::{enqueue_job, DispatchJob};
use crate::error::AppError;
use crate::geo;
use crate::models::matching::{DispatchPhase, DispatchRecord, OfferResponse};
use crate::models::pricing::{PriceBreakdown, Voucher};
use crate::models::provider::GeoPoint;
use crate::models::request::{ServiceItem, ServiceRequest};
use crate::pricing;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dispatch", post(create_dispatch))
        .route("/dispatch/:id", get(get_dispatch))
        .route("/dispatch/:id/cancel", post(cancel_dispatch))
        .route("/offers/:id/respond", post(respond_to_offer))
        .route("/quotes", post(quote))
}

#[derive(Deserialize)]
pub struct ServiceItemRequest {
    pub name: String,
    pub price: Decimal,
    pub duration_minutes: u32,
}

#[derive(Deserialize)]
pub struct CreateDispatchRequest {
    pub requester_id: Uuid,
    pub origin: GeoPoint,
    pub radius_km: f64,
    pub price_ceiling: Decimal,
    pub services: Vec<ServiceItemRequest>,
    pub voucher: Option<Voucher>,
    pub credit_balance: Option<Decimal>,
    pub exclude_providers: Option<Vec<Uuid>>,
    /// A previous dispatch of the same requester whose rejections should be
    /// excluded from this attempt.
    pub retry_of: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct OfferResponseRequest {
    pub response: OfferResponse,
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub services: Vec<ServiceItemRequest>,
    pub distance_km: f64,
    pub voucher: Option<Voucher>,
    pub credit_balance: Option<Decimal>,
}

async fn create_dispatch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDispatchRequest>,
) -> Result<Json<DispatchRecord>, AppError> {
    geo::validate(&payload.origin)?;

    if payload.radius_km <= 0.0 {
        return Err(AppError::BadRequest("radius_km must be > 0".to_string()));
    }
    if payload.price_ceiling <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "price_ceiling must be > 0".to_string(),
        ));
    }
    if payload.services.is_empty() {
        return Err(AppError::BadRequest(
            "at least one service is required".to_string(),
        ));
    }

    let mut excluded: HashSet<Uuid> = payload.exclude_providers.unwrap_or_default().into_iter().collect();
    if let Some(retry_of) = payload.retry_of {
        let prior = state
            .dispatches
            .get(&retry_of)
            .ok_or_else(|| AppError::NotFound(format!("dispatch {} not found", retry_of)))?;
        excluded.extend(prior.rejected_providers.iter().copied());
    }

    let services: Vec<ServiceItem> = payload
        .services
        .into_iter()
        .map(|s| ServiceItem {
            id: Uuid::new_v4(),
            name: s.name,
            price: s.price,
            duration_minutes: s.duration_minutes,
        })
        .collect();

    let request = ServiceRequest {
        id: Uuid::new_v4(),
        requester_id: payload.requester_id,
        origin: payload.origin,
        radius_km: payload.radius_km,
        price_ceiling: payload.price_ceiling,
        excluded_providers: excluded,
        services,
        voucher: payload.voucher,
        credit_balance: payload.credit_balance.unwrap_or(Decimal::ZERO),
        created_at: Utc::now(),
    };

    let now = Utc::now();
    let record = DispatchRecord {
        id: request.id,
        requester_id: request.requester_id,
        phase: DispatchPhase::Queued,
        rejected_providers: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.dispatches.insert(record.id, record.clone());

    let (cancel_tx, _cancel_rx) = watch::channel(false);
    state.dispatch_cancels.insert(request.id, cancel_tx);

    enqueue_job(&state, DispatchJob { request }).await?;

    Ok(Json(record))
}

async fn get_dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchRecord>, AppError> {
    let record = state
        .dispatches
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("dispatch {} not found", id)))?;

    Ok(Json(record.value().clone()))
}

async fn cancel_dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<DispatchRecord>), AppError> {
    let record = state
        .dispatches
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("dispatch {} not found", id)))?
        .clone();

    if record.phase.is_terminal() {
        return Err(AppError::Conflict("dispatch already settled".to_string()));
    }

    if let Some(cancel) = state.dispatch_cancels.get(&id) {
        // send_replace stores the flag even when the session has not
        // subscribed yet, so a cancel can never race the session startup
        cancel.send_replace(true);
    }

    Ok((StatusCode::ACCEPTED, Json(record)))
}

async fn respond_to_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferResponseRequest>,
) -> Result<Json<Value>, AppError> {
    let (_, reply_tx) = state
        .pending_offers
        .remove(&id)
        .ok_or(AppError::OfferExpired)?;

    reply_tx
        .send(payload.response)
        .map_err(|_| AppError::OfferExpired)?;

    Ok(Json(json!({ "status": "ok" })))
}

/// Pricing preview. A changed voucher or credit selection before
/// confirmation re-quotes here; the breakdown frozen onto a booking is
/// computed at confirmation time.
async fn quote(
    State(_state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<PriceBreakdown>, AppError> {
    let subtotal: Decimal = payload.services.iter().map(|s| s.price).sum();
    let breakdown = pricing::price_quote(
        subtotal,
        payload.distance_km,
        payload.voucher.as_ref(),
        payload.credit_balance.unwrap_or(Decimal::ZERO),
    )?;

    Ok(Json(breakdown))
}
