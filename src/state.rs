use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::queue::DispatchJob;
use crate::models::booking::Booking;
use crate::models::event::{EngineEvent, LocationUpdate};
use crate::models::matching::{DispatchRecord, OfferResponse};
use crate::models::provider::Provider;
use crate::observability::metrics::Metrics;
use crate::tracking::TrackerHandle;

pub struct AppState {
    pub config: Config,
    pub providers: DashMap<Uuid, Provider>,
    pub dispatches: DashMap<Uuid, DispatchRecord>,
    pub bookings: DashMap<Uuid, Booking>,
    /// Offers awaiting a provider response, keyed by offer id. Removing the
    /// entry is how a response (or the session's own timeout) claims it.
    pub pending_offers: DashMap<Uuid, oneshot::Sender<OfferResponse>>,
    /// Abandon signals, keyed by request id.
    pub dispatch_cancels: DashMap<Uuid, watch::Sender<bool>>,
    /// Live trackers, keyed by booking id.
    pub trackers: DashMap<Uuid, TrackerHandle>,
    pub dispatch_tx: mpsc::Sender<DispatchJob>,
    pub events_tx: broadcast::Sender<EngineEvent>,
    pub position_tx: broadcast::Sender<LocationUpdate>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let (position_tx, _unused_rx) = broadcast::channel(config.position_buffer_size);

        (
            Self {
                config,
                providers: DashMap::new(),
                dispatches: DashMap::new(),
                bookings: DashMap::new(),
                pending_offers: DashMap::new(),
                dispatch_cancels: DashMap::new(),
                trackers: DashMap::new(),
                dispatch_tx,
                events_tx,
                position_tx,
                metrics: Metrics::new(),
            },
            dispatch_rx,
        )
    }

    /// Broadcast an engine event; nobody listening is fine.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Tear down the live tracker of a booking, if one is running. Safe to
    /// call more than once.
    pub fn stop_tracker(&self, booking_id: &Uuid) {
        if let Some((_, handle)) = self.trackers.remove(booking_id) {
            handle.stop();
            self.metrics.active_trackers.dec();
        }
    }
}
