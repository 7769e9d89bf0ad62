pub mod feed;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::geo;
use crate::models::event::{ConnectionState, EngineEvent, LocationUpdate, TrackEvent};
use crate::models::provider::GeoPoint;
use crate::state::AppState;

use self::feed::PositionFeed;

/// One applied position sample with its derived ETA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub location: GeoPoint,
    pub distance_km: f64,
    pub eta_minutes: f64,
    /// True exactly once: the first fix inside the arrival threshold.
    pub arrival: bool,
    pub server_timestamp: DateTime<Utc>,
}

/// Reconciliation state for one provider's position against a fixed
/// destination. Pure; the surrounding task feeds it from both the push
/// stream and snapshot refetches, so correctness never depends on which
/// source wins.
#[derive(Debug)]
pub struct LiveTrack {
    pub provider_id: Uuid,
    pub destination: GeoPoint,
    pub last_location: Option<GeoPoint>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub connection_state: ConnectionState,
    arrival_fired: bool,
}

impl LiveTrack {
    pub fn new(provider_id: Uuid, destination: GeoPoint) -> Self {
        Self {
            provider_id,
            destination,
            last_location: None,
            last_update_at: None,
            connection_state: ConnectionState::Connecting,
            arrival_fired: false,
        }
    }

    /// Apply one sample. Returns `None` when the sample is for another
    /// provider or does not advance `server_timestamp`; out-of-order and
    /// duplicate updates are dropped, never applied backwards.
    pub fn apply(&mut self, update: &LocationUpdate, config: &TrackerConfig) -> Option<PositionFix> {
        if update.provider_id != self.provider_id {
            return None;
        }
        if let Some(last) = self.last_update_at {
            if update.server_timestamp <= last {
                return None;
            }
        }

        self.last_location = Some(update.location);
        self.last_update_at = Some(update.server_timestamp);

        let distance_km = geo::haversine_km(&update.location, &self.destination);
        let eta_minutes = geo::estimate_driving_minutes(distance_km, config.avg_speed_kmh);

        let arrival = !self.arrival_fired && distance_km <= config.arrival_threshold_km;
        if arrival {
            self.arrival_fired = true;
        }

        Some(PositionFix {
            location: update.location,
            distance_km,
            eta_minutes,
            arrival,
            server_timestamp: update.server_timestamp,
        })
    }
}

/// Handle for tearing a tracker down. `stop` is idempotent; the task owns
/// the subscription, so the underlying stream is released exactly once even
/// when a stop races an in-flight reconnect.
pub struct TrackerHandle {
    cancel_tx: watch::Sender<bool>,
}

impl TrackerHandle {
    pub fn stop(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

pub fn spawn_tracker(
    state: Arc<AppState>,
    feed: Arc<dyn PositionFeed>,
    booking_id: Uuid,
    provider_id: Uuid,
    destination: GeoPoint,
) -> TrackerHandle {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(run_tracker(
        state,
        feed,
        booking_id,
        provider_id,
        destination,
        cancel_rx,
    ));

    TrackerHandle { cancel_tx }
}

/// Long-lived background task for one active booking: subscribe, reconcile,
/// emit position/arrival events, degrade to stale on silence and reconnect
/// with backoff on feed failure. Transient connectivity trouble is never
/// fatal here.
pub async fn run_tracker(
    state: Arc<AppState>,
    feed: Arc<dyn PositionFeed>,
    booking_id: Uuid,
    provider_id: Uuid,
    destination: GeoPoint,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let config = state.config.tracker.clone();
    let mut track = LiveTrack::new(provider_id, destination);
    let mut backoff = config.reconnect_base;

    info!(booking_id = %booking_id, provider_id = %provider_id, "live tracker started");

    'reconnect: loop {
        if *cancel_rx.borrow() {
            break;
        }

        let mut stream = match feed.subscribe(provider_id).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(
                    booking_id = %booking_id,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "position feed subscribe failed"
                );
                set_connection(&state, &mut track, booking_id, ConnectionState::Connecting);

                tokio::select! {
                    _ = sleep(backoff) => {}
                    _ = cancelled(&mut cancel_rx) => break 'reconnect,
                }
                backoff = (backoff * 2).min(config.reconnect_max);
                continue;
            }
        };

        backoff = config.reconnect_base;
        set_connection(&state, &mut track, booking_id, ConnectionState::Subscribed);

        // re-seed from the authoritative snapshot before trusting
        // incremental updates again
        if let Ok(Some(snapshot)) = feed.snapshot(provider_id).await {
            handle_update(&state, &mut track, booking_id, &snapshot, &config);
        }

        loop {
            tokio::select! {
                _ = cancelled(&mut cancel_rx) => break 'reconnect,
                next = timeout(config.staleness_window, stream.next()) => match next {
                    Ok(Some(update)) => {
                        if track.connection_state == ConnectionState::Stale {
                            set_connection(&state, &mut track, booking_id, ConnectionState::Subscribed);
                        }
                        handle_update(&state, &mut track, booking_id, &update, &config);
                    }
                    Ok(None) => {
                        warn!(booking_id = %booking_id, "position feed closed");
                        set_connection(&state, &mut track, booking_id, ConnectionState::Closed);
                        continue 'reconnect;
                    }
                    // silence is not an error: keep the last known fix on
                    // display and keep waiting
                    Err(_) => {
                        if track.connection_state != ConnectionState::Stale {
                            warn!(
                                booking_id = %booking_id,
                                last_update_at = ?track.last_update_at,
                                last_known = ?track.last_location,
                                "position feed silent; marking track stale"
                            );
                        }
                        set_connection(&state, &mut track, booking_id, ConnectionState::Stale);
                    }
                }
            }
        }
    }

    info!(booking_id = %booking_id, "live tracker stopped");
}

fn handle_update(
    state: &AppState,
    track: &mut LiveTrack,
    booking_id: Uuid,
    update: &LocationUpdate,
    config: &TrackerConfig,
) {
    let Some(fix) = track.apply(update, config) else {
        return;
    };

    state.emit(EngineEvent::Track {
        booking_id,
        event: TrackEvent::Position {
            location: fix.location,
            distance_km: fix.distance_km,
            eta_minutes: fix.eta_minutes,
            server_timestamp: fix.server_timestamp,
        },
    });

    if fix.arrival {
        info!(booking_id = %booking_id, provider_id = %track.provider_id, "provider arrived");
        state.emit(EngineEvent::Track {
            booking_id,
            event: TrackEvent::ArrivalReached,
        });
    }
}

fn set_connection(
    state: &AppState,
    track: &mut LiveTrack,
    booking_id: Uuid,
    to: ConnectionState,
) {
    if track.connection_state == to {
        return;
    }
    track.connection_state = to;
    state.emit(EngineEvent::Track {
        booking_id,
        event: TrackEvent::ConnectionChanged { state: to },
    });
}

/// Resolves once the cancel flag flips; pends forever if the handle is gone
/// without ever cancelling.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await;
}
