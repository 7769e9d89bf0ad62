use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::matching::{MatchOutcome, ScoreBreakdown, ScoredCandidate};
use crate::models::provider::Provider;
use crate::models::request::ServiceRequest;

const DISTANCE_WEIGHT: f64 = 0.40;
const RATING_WEIGHT: f64 = 0.30;
const EXPERIENCE_WEIGHT: f64 = 0.30;

/// Candidates past this distance score 0 on the distance axis; far outliers
/// are capped rather than penalized forever.
const DISTANCE_CAP_KM: f64 = 20.0;
/// Experience saturates logarithmically: the hundredth completed job is
/// worth far less than the second.
const EXPERIENCE_SATURATION_JOBS: f64 = 100.0;

pub fn score_candidate(
    provider: Provider,
    request: &ServiceRequest,
) -> Result<ScoredCandidate, AppError> {
    let distance_km = geo::distance_km(&request.origin, &provider.location)?;

    let breakdown = ScoreBreakdown {
        distance_score: distance_score(distance_km),
        rating_score: rating_score(provider.rating),
        experience_score: experience_score(provider.completed_jobs),
    };

    let score = weighted_score(&breakdown);
    Ok(ScoredCandidate {
        provider,
        distance_km,
        score,
        breakdown,
    })
}

pub fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.distance_score * DISTANCE_WEIGHT)
        + (breakdown.rating_score * RATING_WEIGHT)
        + (breakdown.experience_score * EXPERIENCE_WEIGHT)
}

fn distance_score(distance_km: f64) -> f64 {
    (1.0 - distance_km / DISTANCE_CAP_KM).max(0.0) * 100.0
}

fn rating_score(rating: f64) -> f64 {
    (rating / 5.0).clamp(0.0, 1.0) * 100.0
}

fn experience_score(completed_jobs: u32) -> f64 {
    let saturation = (EXPERIENCE_SATURATION_JOBS + 1.0).log10();
    ((completed_jobs as f64 + 1.0).log10() / saturation * 100.0).min(100.0)
}

/// Rank candidates best-first. The order is a total one: ties resolve by
/// lower distance, then higher rating, then id, so repeated calls over the
/// same pool always agree.
pub fn rank(
    providers: Vec<Provider>,
    request: &ServiceRequest,
) -> Result<Vec<ScoredCandidate>, AppError> {
    let mut ranked = providers
        .into_iter()
        .map(|provider| score_candidate(provider, request))
        .collect::<Result<Vec<_>, _>>()?;

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.distance_km.total_cmp(&b.distance_km))
            .then_with(|| b.provider.rating.total_cmp(&a.provider.rating))
            .then_with(|| a.provider.id.cmp(&b.provider.id))
    });

    Ok(ranked)
}

/// Pick the primary and up to `n - 1` backups from a ranked list.
pub fn select_top_n(ranked: Vec<ScoredCandidate>, n: usize) -> Result<MatchOutcome, AppError> {
    let primary = ranked
        .first()
        .ok_or(AppError::NoEligibleCandidates)?
        .provider
        .id;
    let backups: Vec<Uuid> = ranked
        .iter()
        .skip(1)
        .take(n.saturating_sub(1))
        .map(|c| c.provider.id)
        .collect();

    Ok(MatchOutcome {
        attempt_id: Uuid::new_v4(),
        primary,
        backups,
        ranked: ranked.into_iter().take(n.max(1)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{rank, score_candidate, select_top_n};
    use crate::error::AppError;
    use crate::models::provider::{GeoPoint, Provider, ProviderStatus};
    use crate::models::request::ServiceRequest;

    const ORIGIN: GeoPoint = GeoPoint {
        lat: 3.1390,
        lng: 101.6869,
    };

    fn km_north(km: f64) -> GeoPoint {
        GeoPoint {
            lat: ORIGIN.lat + km / 111.0,
            lng: ORIGIN.lng,
        }
    }

    fn provider(seed: u128, km: f64, rating: f64, completed_jobs: u32) -> Provider {
        Provider {
            id: Uuid::from_u128(seed),
            name: format!("provider-{seed}"),
            location: km_north(km),
            rating,
            completed_jobs,
            cheapest_price: Decimal::new(2_500, 2),
            service_radius_km: 20.0,
            status: ProviderStatus::Available,
            updated_at: Utc::now(),
        }
    }

    fn request() -> ServiceRequest {
        ServiceRequest {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            origin: ORIGIN,
            radius_km: 30.0,
            price_ceiling: Decimal::new(5_000, 2),
            excluded_providers: HashSet::new(),
            services: Vec::new(),
            voucher: None,
            credit_balance: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn distance_beyond_cap_floors_at_zero() {
        let scored = score_candidate(provider(1, 25.0, 4.0, 50), &request()).unwrap();
        assert_eq!(scored.breakdown.distance_score, 0.0);
        assert!(scored.score >= 0.0);
    }

    #[test]
    fn experience_saturates_logarithmically() {
        let req = request();
        let rookie = score_candidate(provider(1, 1.0, 4.0, 1), &req).unwrap();
        let ten = score_candidate(provider(2, 1.0, 4.0, 10), &req).unwrap();
        let veteran = score_candidate(provider(3, 1.0, 4.0, 100), &req).unwrap();
        let outlier = score_candidate(provider(4, 1.0, 4.0, 100_000), &req).unwrap();

        assert!(rookie.breakdown.experience_score < veteran.breakdown.experience_score);
        assert!((veteran.breakdown.experience_score - 100.0).abs() < 1e-9);
        assert_eq!(outlier.breakdown.experience_score, 100.0);

        // marginal value decays: 1 -> 10 jobs gains more than 10 -> 100
        let early_gain = ten.breakdown.experience_score - rookie.breakdown.experience_score;
        let late_gain = veteran.breakdown.experience_score - ten.breakdown.experience_score;
        assert!(early_gain > late_gain - 1e-9);
    }

    #[test]
    fn closer_better_rated_more_experienced_wins() {
        let ranked = rank(
            vec![
                provider(1, 8.0, 3.5, 5),
                provider(2, 1.0, 4.9, 200),
                provider(3, 4.0, 4.2, 60),
            ],
            &request(),
        )
        .unwrap();

        let ids: Vec<u128> = ranked.iter().map(|c| c.provider.id.as_u128()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn ranking_is_deterministic_across_calls() {
        let providers: Vec<Provider> = (0..12)
            .map(|i| provider(i as u128 + 1, (i % 4) as f64, 4.0, 10 * i))
            .collect();
        let req = request();

        let first = rank(providers.clone(), &req).unwrap();
        let second = rank(providers, &req).unwrap();

        let first_ids: Vec<Uuid> = first.iter().map(|c| c.provider.id).collect();
        let second_ids: Vec<Uuid> = second.iter().map(|c| c.provider.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn exact_ties_fall_back_to_id_order() {
        // identical distance, rating and experience: only the id differs
        let ranked = rank(
            vec![
                provider(9, 2.0, 4.0, 30),
                provider(3, 2.0, 4.0, 30),
                provider(6, 2.0, 4.0, 30),
            ],
            &request(),
        )
        .unwrap();

        let ids: Vec<u128> = ranked.iter().map(|c| c.provider.id.as_u128()).collect();
        assert_eq!(ids, vec![3, 6, 9]);
    }

    #[test]
    fn equal_scores_prefer_shorter_distance() {
        // both candidates floor at distance_score 0 past the cap, their
        // scores tie, and the nearer one must win
        let far = provider(1, 22.0, 4.0, 30);
        let farther = provider(2, 28.0, 4.0, 30);
        let ranked = rank(vec![farther, far], &request()).unwrap();

        assert_eq!(ranked[0].provider.id, Uuid::from_u128(1));
    }

    #[test]
    fn select_top_n_splits_primary_and_backups() {
        let ranked = rank(
            vec![
                provider(1, 1.0, 4.8, 120),
                provider(2, 3.0, 4.1, 40),
                provider(3, 4.9, 3.9, 15),
                provider(4, 6.0, 4.5, 80),
            ],
            &request(),
        )
        .unwrap();

        let outcome = select_top_n(ranked, 3).unwrap();
        assert_eq!(outcome.primary, Uuid::from_u128(1));
        assert_eq!(outcome.backups.len(), 2);
        assert_eq!(outcome.ranked.len(), 3);
    }

    #[test]
    fn selecting_from_an_empty_pool_fails() {
        let result = select_top_n(Vec::new(), 3);
        assert!(matches!(result, Err(AppError::NoEligibleCandidates)));
    }
}
