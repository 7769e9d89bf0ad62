use std::time::Duration;

use crate::engine::directory::ProviderDirectory;
use crate::error::AppError;
use crate::geo;
use crate::models::provider::{Provider, ProviderStatus};
use crate::models::request::ServiceRequest;

/// Fetch the providers currently eligible for one matching attempt.
///
/// An empty result is a valid business outcome, distinct from the transport
/// failure `DirectoryUnavailable`. Every constraint is re-checked here even
/// when the directory claims to have filtered already.
pub async fn fetch_eligible(
    directory: &dyn ProviderDirectory,
    request: &ServiceRequest,
    directory_timeout: Duration,
) -> Result<Vec<Provider>, AppError> {
    geo::validate(&request.origin)?;

    let listed = tokio::time::timeout(
        directory_timeout,
        directory.list_providers(&request.origin, request.radius_km, request.price_ceiling),
    )
    .await
    .map_err(|_| AppError::DirectoryUnavailable("directory timed out".to_string()))?
    .map_err(|err| AppError::DirectoryUnavailable(err.to_string()))?;

    let eligible = listed
        .into_iter()
        .filter(|provider| is_eligible(provider, request))
        .collect();

    Ok(eligible)
}

fn is_eligible(provider: &Provider, request: &ServiceRequest) -> bool {
    if provider.status != ProviderStatus::Available {
        return false;
    }
    if request.excluded_providers.contains(&provider.id) {
        return false;
    }
    if provider.cheapest_price > request.price_ceiling {
        return false;
    }

    let distance = match geo::distance_km(&request.origin, &provider.location) {
        Ok(d) => d,
        // garbage upstream coordinates disqualify the candidate, not the pool
        Err(_) => return false,
    };

    // Two-sided radius check: the requester's search radius and the
    // provider's own declared service radius must both admit the distance.
    distance <= request.radius_km && distance <= provider.service_radius_km
}
