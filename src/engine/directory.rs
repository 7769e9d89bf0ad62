use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::geo;
use crate::models::provider::{GeoPoint, Provider, ProviderStatus};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// The external provider directory. Results are a hint only: the candidate
/// pool re-checks every constraint instead of trusting upstream filtering.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    async fn list_providers(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        price_ceiling: Decimal,
    ) -> Result<Vec<Provider>, DirectoryError>;
}

/// Directory backed by the in-process provider registry.
pub struct RegistryDirectory {
    state: Arc<AppState>,
}

impl RegistryDirectory {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ProviderDirectory for RegistryDirectory {
    async fn list_providers(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        price_ceiling: Decimal,
    ) -> Result<Vec<Provider>, DirectoryError> {
        let listed = self
            .state
            .providers
            .iter()
            .filter_map(|entry| {
                let provider = entry.value();
                let listed = provider.status == ProviderStatus::Available
                    && provider.cheapest_price <= price_ceiling
                    && geo::haversine_km(center, &provider.location) <= radius_km;

                if listed {
                    Some(provider.clone())
                } else {
                    None
                }
            })
            .collect();

        Ok(listed)
    }
}
