use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::engine::directory::{ProviderDirectory, RegistryDirectory};
use crate::engine::pool;
use crate::engine::queue::DispatchJob;
use crate::engine::scoring;
use crate::error::AppError;
use crate::lifecycle;
use crate::models::event::EngineEvent;
use crate::models::matching::{
    DispatchPhase, DispatchRecord, ExhaustReason, JobOffer, MatchOutcome, OfferResponse,
};
use crate::models::provider::{Provider, ProviderStatus};
use crate::models::request::ServiceRequest;
use crate::state::AppState;
use crate::tracking::cancelled;

pub async fn run_dispatch_engine(state: Arc<AppState>, mut job_rx: mpsc::Receiver<DispatchJob>) {
    info!("dispatch engine started");

    while let Some(job) = job_rx.recv().await {
        state.metrics.dispatch_queue_depth.dec();

        let directory: Arc<dyn ProviderDirectory> = Arc::new(RegistryDirectory::new(state.clone()));
        let session = DispatchSession::new(state.clone(), directory, job.request);
        tokio::spawn(session.run());
    }

    warn!("dispatch engine stopped: queue channel closed");
}

enum SessionEnd {
    Confirmed,
    Exhausted(ExhaustReason),
    Abandoned,
}

enum OfferWait {
    Replied(OfferResponse),
    NoReply,
    Cancelled,
}

/// One matching attempt end-to-end: pool, rank, then strictly sequential
/// offers down the ranked list until someone accepts or the list runs dry.
/// Never more than one offer is outstanding, so a provider cannot be
/// double-booked by the same request.
pub struct DispatchSession {
    state: Arc<AppState>,
    directory: Arc<dyn ProviderDirectory>,
    config: DispatchConfig,
    request: ServiceRequest,
    /// Providers that rejected or timed out in this session. Owned by this
    /// session alone; surfaced on the record so a retry can exclude them.
    rejected: Vec<Uuid>,
    cancel_rx: watch::Receiver<bool>,
}

impl DispatchSession {
    pub fn new(
        state: Arc<AppState>,
        directory: Arc<dyn ProviderDirectory>,
        request: ServiceRequest,
    ) -> Self {
        let config = state.config.dispatch.clone();

        let cancel_rx = match state.dispatch_cancels.get(&request.id) {
            Some(entry) => entry.value().subscribe(),
            None => {
                let (cancel_tx, cancel_rx) = watch::channel(false);
                state.dispatch_cancels.insert(request.id, cancel_tx);
                cancel_rx
            }
        };

        let now = Utc::now();
        state
            .dispatches
            .entry(request.id)
            .or_insert_with(|| DispatchRecord {
                id: request.id,
                requester_id: request.requester_id,
                phase: DispatchPhase::Queued,
                rejected_providers: Vec::new(),
                created_at: now,
                updated_at: now,
            });

        Self {
            state,
            directory,
            config,
            request,
            rejected: Vec::new(),
            cancel_rx,
        }
    }

    pub async fn run(mut self) {
        let start = Instant::now();
        let end = self.drive().await;

        let outcome = match end {
            SessionEnd::Confirmed => "confirmed",
            SessionEnd::Exhausted(_) => "exhausted",
            SessionEnd::Abandoned => "abandoned",
        };
        let elapsed = start.elapsed().as_secs_f64();
        self.state
            .metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);
        self.state
            .metrics
            .dispatch_sessions_total
            .with_label_values(&[outcome])
            .inc();
        self.state.dispatch_cancels.remove(&self.request.id);
    }

    async fn drive(&mut self) -> SessionEnd {
        self.set_phase(DispatchPhase::Searching);

        let candidates = match self.search_with_retry().await {
            Ok(candidates) => candidates,
            Err(end) => return end,
        };

        if candidates.is_empty() {
            info!(request_id = %self.request.id, "no providers in range");
            return self.exhaust(ExhaustReason::NoCandidates);
        }

        // scoring is a pure map over the pool; the sort inside rank() is the
        // single deterministic reduction that fixes the offer order
        let selected = scoring::rank(candidates, &self.request)
            .and_then(|ranked| scoring::select_top_n(ranked, self.config.selection_size));
        let outcome = match selected {
            Ok(outcome) => outcome,
            Err(_) => {
                info!(request_id = %self.request.id, "no eligible candidates");
                return self.exhaust(ExhaustReason::NoCandidates);
            }
        };

        info!(
            request_id = %self.request.id,
            primary = %outcome.primary,
            backups = outcome.backups.len(),
            "candidates ranked"
        );

        let order: Vec<Uuid> = std::iter::once(outcome.primary)
            .chain(outcome.backups.iter().copied())
            .collect();

        for (position, provider_id) in order.into_iter().enumerate() {
            if *self.cancel_rx.borrow() {
                return self.abandon(None);
            }

            let offer = JobOffer {
                offer_id: Uuid::new_v4(),
                request_id: self.request.id,
                provider_id,
                position,
                offered_at: Utc::now(),
            };

            let (reply_tx, reply_rx) = oneshot::channel();
            self.state.pending_offers.insert(offer.offer_id, reply_tx);
            self.set_phase(DispatchPhase::Offering {
                position,
                provider_id,
            });
            self.state.emit(EngineEvent::OfferIssued {
                offer: offer.clone(),
            });
            info!(
                request_id = %self.request.id,
                provider_id = %provider_id,
                position,
                "offer extended"
            );

            let wait = self.await_reply(reply_rx).await;
            match wait {
                OfferWait::Cancelled => return self.abandon(Some(&offer)),
                OfferWait::Replied(OfferResponse::Accepted) => {
                    self.state
                        .metrics
                        .offers_total
                        .with_label_values(&["accepted"])
                        .inc();
                    self.state.emit(EngineEvent::OfferResolved {
                        offer_id: offer.offer_id,
                        provider_id,
                        response: OfferResponse::Accepted,
                    });
                    return self.confirm(&outcome, provider_id);
                }
                OfferWait::Replied(OfferResponse::Rejected) => {
                    self.rejected.push(provider_id);
                    self.state
                        .metrics
                        .offers_total
                        .with_label_values(&["rejected"])
                        .inc();
                    self.state.emit(EngineEvent::OfferResolved {
                        offer_id: offer.offer_id,
                        provider_id,
                        response: OfferResponse::Rejected,
                    });
                    info!(request_id = %self.request.id, provider_id = %provider_id, "offer rejected");
                }
                OfferWait::NoReply => {
                    self.state.pending_offers.remove(&offer.offer_id);
                    self.rejected.push(provider_id);
                    self.state
                        .metrics
                        .offers_total
                        .with_label_values(&["timed_out"])
                        .inc();
                    self.state.emit(EngineEvent::OfferTimedOut {
                        offer_id: offer.offer_id,
                        provider_id,
                    });
                    info!(request_id = %self.request.id, provider_id = %provider_id, "offer timed out");
                }
            }
        }

        self.exhaust(ExhaustReason::AllDeclined)
    }

    /// One bounded, cancellable wait per offer; never a busy poll.
    async fn await_reply(&mut self, reply_rx: oneshot::Receiver<OfferResponse>) -> OfferWait {
        let offer_timeout = self.config.offer_timeout;
        let mut cancel_rx = self.cancel_rx.clone();

        tokio::select! {
            result = timeout(offer_timeout, reply_rx) => match result {
                Ok(Ok(response)) => OfferWait::Replied(response),
                // elapsed, or the reply channel vanished without a response
                _ => OfferWait::NoReply,
            },
            _ = cancelled(&mut cancel_rx) => OfferWait::Cancelled,
        }
    }

    /// A transport failure during the search is retried exactly once after a
    /// short backoff; a second consecutive failure surfaces distinctly from
    /// an empty pool.
    async fn search_with_retry(&mut self) -> Result<Vec<Provider>, SessionEnd> {
        let first = pool::fetch_eligible(
            self.directory.as_ref(),
            &self.request,
            self.config.directory_timeout,
        )
        .await;

        match first {
            Ok(candidates) => Ok(candidates),
            Err(AppError::DirectoryUnavailable(err)) => {
                warn!(
                    request_id = %self.request.id,
                    error = %err,
                    "directory fetch failed; retrying once"
                );

                let mut cancel_rx = self.cancel_rx.clone();
                tokio::select! {
                    _ = sleep(self.config.search_retry_backoff) => {}
                    _ = cancelled(&mut cancel_rx) => return Err(self.abandon(None)),
                }

                match pool::fetch_eligible(
                    self.directory.as_ref(),
                    &self.request,
                    self.config.directory_timeout,
                )
                .await
                {
                    Ok(candidates) => Ok(candidates),
                    Err(err) => {
                        error!(request_id = %self.request.id, error = %err, "directory failed twice");
                        Err(self.exhaust(ExhaustReason::DirectoryUnreachable))
                    }
                }
            }
            Err(err) => {
                error!(request_id = %self.request.id, error = %err, "search failed");
                Err(self.exhaust(ExhaustReason::NoCandidates))
            }
        }
    }

    fn confirm(&mut self, outcome: &MatchOutcome, provider_id: Uuid) -> SessionEnd {
        let distance_km = outcome
            .ranked
            .iter()
            .find(|c| c.provider.id == provider_id)
            .map(|c| c.distance_km)
            .unwrap_or_default();

        if let Some(mut provider) = self.state.providers.get_mut(&provider_id) {
            provider.status = ProviderStatus::Busy;
            provider.updated_at = Utc::now();
        }

        let booking = lifecycle::create_booking(&self.state, &self.request, provider_id, distance_km);

        self.set_phase(DispatchPhase::Confirmed {
            provider_id,
            booking_id: booking.id,
        });
        self.state.emit(EngineEvent::DispatchConfirmed {
            request_id: self.request.id,
            provider_id,
            booking_id: booking.id,
        });
        info!(
            request_id = %self.request.id,
            provider_id = %provider_id,
            booking_id = %booking.id,
            "dispatch confirmed"
        );

        SessionEnd::Confirmed
    }

    fn exhaust(&mut self, reason: ExhaustReason) -> SessionEnd {
        self.set_phase(DispatchPhase::Exhausted { reason });
        self.state.emit(EngineEvent::DispatchExhausted {
            request_id: self.request.id,
            reason,
        });
        info!(request_id = %self.request.id, reason = ?reason, "dispatch exhausted");
        SessionEnd::Exhausted(reason)
    }

    fn abandon(&mut self, outstanding: Option<&JobOffer>) -> SessionEnd {
        if let Some(offer) = outstanding {
            self.state.pending_offers.remove(&offer.offer_id);
            self.state
                .metrics
                .offers_total
                .with_label_values(&["retracted"])
                .inc();
            self.state.emit(EngineEvent::OfferRetracted {
                offer_id: offer.offer_id,
                provider_id: offer.provider_id,
            });
        }

        self.set_phase(DispatchPhase::Abandoned);
        self.state.emit(EngineEvent::DispatchAbandoned {
            request_id: self.request.id,
        });
        info!(request_id = %self.request.id, "dispatch abandoned");

        SessionEnd::Abandoned
    }

    fn set_phase(&self, phase: DispatchPhase) {
        if let Some(mut record) = self.state.dispatches.get_mut(&self.request.id) {
            record.phase = phase;
            record.rejected_providers = self.rejected.clone();
            record.updated_at = Utc::now();
        }
    }
}
