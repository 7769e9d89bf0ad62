use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::event::LocationUpdate;
use crate::models::provider::{GeoPoint, Provider, ProviderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", post(create_provider).get(list_providers))
        .route("/providers/:id/status", patch(update_provider_status))
        .route("/providers/:id/location", patch(update_provider_location))
}

#[derive(Deserialize)]
pub struct CreateProviderRequest {
    pub name: String,
    pub location: GeoPoint,
    pub rating: f64,
    pub completed_jobs: Option<u32>,
    pub cheapest_price: Decimal,
    pub service_radius_km: f64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ProviderStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProviderRequest>,
) -> Result<Json<Provider>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    geo::validate(&payload.location)?;

    if payload.service_radius_km <= 0.0 {
        return Err(AppError::BadRequest(
            "service_radius_km must be > 0".to_string(),
        ));
    }

    if payload.cheapest_price < Decimal::ZERO {
        return Err(AppError::BadRequest(
            "cheapest_price cannot be negative".to_string(),
        ));
    }

    let provider = Provider {
        id: Uuid::new_v4(),
        name: payload.name,
        location: payload.location,
        rating: payload.rating.clamp(0.0, 5.0),
        completed_jobs: payload.completed_jobs.unwrap_or(0),
        cheapest_price: payload.cheapest_price,
        service_radius_km: payload.service_radius_km,
        status: ProviderStatus::Available,
        updated_at: Utc::now(),
    };

    state.providers.insert(provider.id, provider.clone());
    Ok(Json(provider))
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<Provider>> {
    let providers = state
        .providers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(providers)
}

async fn update_provider_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Provider>, AppError> {
    let mut provider = state
        .providers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("provider {} not found", id)))?;

    provider.status = payload.status;
    provider.updated_at = Utc::now();

    Ok(Json(provider.clone()))
}

/// Moves the provider and publishes the sample into the realtime position
/// feed that live trackers subscribe to.
async fn update_provider_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Provider>, AppError> {
    geo::validate(&payload.location)?;

    let update = {
        let mut provider = state
            .providers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("provider {} not found", id)))?;

        provider.location = payload.location;
        provider.updated_at = Utc::now();

        LocationUpdate {
            provider_id: id,
            location: provider.location,
            server_timestamp: provider.updated_at,
        }
    };

    let _ = state.position_tx.send(update);

    let provider = state
        .providers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("provider {} not found", id)))?;
    Ok(Json(provider.clone()))
}
