use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::event::EngineEvent;
use crate::models::provider::ProviderStatus;
use crate::models::request::ServiceRequest;
use crate::pricing;
use crate::state::AppState;
use crate::tracking::feed::BroadcastFeed;
use crate::tracking::spawn_tracker;

/// The forward path is `pending -> accepted -> on_the_way -> in_progress ->
/// completed`; nothing skips a stage. Cancellation is allowed from any
/// non-terminal stage and nothing leaves a terminal one.
pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;

    matches!(
        (from, to),
        (Pending, Accepted) | (Accepted, OnTheWay) | (OnTheWay, InProgress) | (InProgress, Completed)
    ) || (!from.is_terminal() && to == Cancelled)
}

/// Create a booking for a confirmed match. The price breakdown is computed
/// here once and is immutable from confirmation on.
pub fn create_booking(
    state: &Arc<AppState>,
    request: &ServiceRequest,
    provider_id: Uuid,
    distance_km: f64,
) -> Booking {
    let price = pricing::price_or_drop_voucher(
        request.subtotal(),
        distance_km,
        request.voucher.as_ref(),
        request.credit_balance,
    );

    let now = Utc::now();
    let booking = Booking {
        id: Uuid::new_v4(),
        request_id: request.id,
        requester_id: request.requester_id,
        provider_id,
        services: request.services.clone(),
        destination: request.origin,
        price,
        status: BookingStatus::Pending,
        cancelled_from: None,
        points_awarded: None,
        created_at: now,
        updated_at: now,
    };

    state.bookings.insert(booking.id, booking.clone());
    state
        .metrics
        .bookings_total
        .with_label_values(&[BookingStatus::Pending.as_str()])
        .inc();

    info!(
        booking_id = %booking.id,
        provider_id = %provider_id,
        total = %booking.price.total,
        "booking created"
    );

    booking
}

/// Apply one lifecycle transition and its side effects: tracker start on
/// acceptance, tracker teardown and provider release on a terminal state,
/// one-shot loyalty accrual on completion.
pub fn transition(
    state: &Arc<AppState>,
    booking_id: Uuid,
    to: BookingStatus,
) -> Result<Booking, AppError> {
    let (from, updated) = {
        let mut entry = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {} not found", booking_id)))?;

        let from = entry.status;
        if !can_transition(from, to) {
            return Err(AppError::Conflict(format!(
                "booking cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }

        entry.status = to;
        entry.updated_at = Utc::now();
        if to == BookingStatus::Cancelled {
            // captured for the external cancellation-charge policy
            entry.cancelled_from = Some(from);
        }
        if to == BookingStatus::Completed && entry.points_awarded.is_none() {
            entry.points_awarded = Some(pricing::loyalty_points(entry.price.subtotal));
        }

        (from, entry.clone())
    };

    if to == BookingStatus::Accepted {
        let feed = Arc::new(BroadcastFeed::new(state.clone()));
        let handle = spawn_tracker(
            state.clone(),
            feed,
            booking_id,
            updated.provider_id,
            updated.destination,
        );
        state.trackers.insert(booking_id, handle);
        state.metrics.active_trackers.inc();
    }

    if to.is_terminal() {
        state.stop_tracker(&booking_id);
        release_provider(state, &updated, to);
    }

    state
        .metrics
        .bookings_total
        .with_label_values(&[to.as_str()])
        .inc();
    state.emit(EngineEvent::BookingTransition {
        booking_id,
        from,
        to,
    });

    info!(
        booking_id = %booking_id,
        from = from.as_str(),
        to = to.as_str(),
        "booking transition"
    );

    Ok(updated)
}

fn release_provider(state: &Arc<AppState>, booking: &Booking, to: BookingStatus) {
    if let Some(mut provider) = state.providers.get_mut(&booking.provider_id) {
        provider.status = ProviderStatus::Available;
        provider.updated_at = Utc::now();
        if to == BookingStatus::Completed {
            provider.completed_jobs = provider.completed_jobs.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{can_transition, create_booking, transition};
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::booking::BookingStatus;
    use crate::models::provider::{GeoPoint, Provider, ProviderStatus};
    use crate::models::request::{ServiceItem, ServiceRequest};
    use crate::state::AppState;

    fn test_config() -> Config {
        Config {
            http_port: 0,
            log_level: "warn".to_string(),
            dispatch_queue_size: 16,
            event_buffer_size: 64,
            position_buffer_size: 64,
            dispatch: Default::default(),
            tracker: Default::default(),
        }
    }

    fn request() -> ServiceRequest {
        ServiceRequest {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            origin: GeoPoint {
                lat: 3.1390,
                lng: 101.6869,
            },
            radius_km: 5.0,
            price_ceiling: Decimal::new(5_000, 2),
            excluded_providers: HashSet::new(),
            services: vec![ServiceItem {
                id: Uuid::new_v4(),
                name: "haircut".to_string(),
                price: Decimal::new(3_500, 2),
                duration_minutes: 45,
            }],
            voucher: None,
            credit_balance: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    fn provider(id: Uuid) -> Provider {
        Provider {
            id,
            name: "test-provider".to_string(),
            location: GeoPoint {
                lat: 3.1400,
                lng: 101.6869,
            },
            rating: 4.5,
            completed_jobs: 10,
            cheapest_price: Decimal::new(2_000, 2),
            service_radius_km: 10.0,
            status: ProviderStatus::Busy,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn forward_path_has_no_skips() {
        use BookingStatus::*;

        assert!(can_transition(Pending, Accepted));
        assert!(can_transition(Accepted, OnTheWay));
        assert!(can_transition(OnTheWay, InProgress));
        assert!(can_transition(InProgress, Completed));

        assert!(!can_transition(Pending, OnTheWay));
        assert!(!can_transition(Pending, Completed));
        assert!(!can_transition(Accepted, InProgress));
        assert!(!can_transition(Accepted, Pending));
        assert!(!can_transition(Completed, Cancelled));
        assert!(!can_transition(Cancelled, Pending));
    }

    #[test]
    fn cancellation_is_reachable_from_every_non_terminal_state() {
        use BookingStatus::*;

        for from in [Pending, Accepted, OnTheWay, InProgress] {
            assert!(can_transition(from, Cancelled));
        }
    }

    #[tokio::test]
    async fn completion_awards_points_exactly_once() {
        let (state, _rx) = AppState::new(test_config());
        let state = Arc::new(state);
        let req = request();
        let provider_id = Uuid::new_v4();
        state.providers.insert(provider_id, provider(provider_id));

        let booking = create_booking(&state, &req, provider_id, 1.2);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.points_awarded.is_none());

        for status in [
            BookingStatus::Accepted,
            BookingStatus::OnTheWay,
            BookingStatus::InProgress,
        ] {
            transition(&state, booking.id, status).unwrap();
        }
        let completed = transition(&state, booking.id, BookingStatus::Completed).unwrap();

        // RM 35.00 subtotal earns 350 points; fees never accrue
        assert_eq!(completed.points_awarded, Some(350));
        assert!(completed.cancelled_from.is_none());

        let provider = state.providers.get(&provider_id).unwrap();
        assert_eq!(provider.status, ProviderStatus::Available);
        assert_eq!(provider.completed_jobs, 11);
    }

    #[tokio::test]
    async fn cancellation_records_the_stage_it_came_from() {
        let (state, _rx) = AppState::new(test_config());
        let state = Arc::new(state);
        let req = request();
        let provider_id = Uuid::new_v4();
        state.providers.insert(provider_id, provider(provider_id));

        let booking = create_booking(&state, &req, provider_id, 1.2);
        transition(&state, booking.id, BookingStatus::Accepted).unwrap();
        transition(&state, booking.id, BookingStatus::OnTheWay).unwrap();
        let cancelled = transition(&state, booking.id, BookingStatus::Cancelled).unwrap();

        assert_eq!(cancelled.cancelled_from, Some(BookingStatus::OnTheWay));
        // no accrual on a cancelled job, regardless of stage
        assert!(cancelled.points_awarded.is_none());
    }

    #[tokio::test]
    async fn terminal_states_tear_the_tracker_down() {
        let (state, _rx) = AppState::new(test_config());
        let state = Arc::new(state);
        let req = request();
        let provider_id = Uuid::new_v4();
        state.providers.insert(provider_id, provider(provider_id));

        let booking = create_booking(&state, &req, provider_id, 1.2);
        transition(&state, booking.id, BookingStatus::Accepted).unwrap();
        assert!(state.trackers.contains_key(&booking.id));

        transition(&state, booking.id, BookingStatus::Cancelled).unwrap();
        assert!(!state.trackers.contains_key(&booking.id));

        // tearing down again is a no-op, not a panic
        state.stop_tracker(&booking.id);
    }

    #[tokio::test]
    async fn illegal_transition_is_a_conflict() {
        let (state, _rx) = AppState::new(test_config());
        let state = Arc::new(state);
        let req = request();
        let provider_id = Uuid::new_v4();

        let booking = create_booking(&state, &req, provider_id, 1.2);
        let result = transition(&state, booking.id, BookingStatus::Completed);
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
