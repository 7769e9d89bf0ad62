use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::models::event::LocationUpdate;
use crate::state::AppState;

pub type PositionStream = Pin<Box<dyn Stream<Item = LocationUpdate> + Send>>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("position feed unavailable: {0}")]
    Unavailable(String),
}

/// The realtime position feed for a single provider. Incremental updates
/// arrive on the stream; `snapshot` returns the current authoritative
/// position and is consulted after every (re)subscribe so the tracker never
/// resumes from a stale cached fix.
#[async_trait]
pub trait PositionFeed: Send + Sync {
    async fn subscribe(&self, provider_id: Uuid) -> Result<PositionStream, FeedError>;

    async fn snapshot(&self, provider_id: Uuid) -> Result<Option<LocationUpdate>, FeedError>;
}

/// Feed backed by the in-process position broadcast, which the provider
/// location endpoint publishes into.
pub struct BroadcastFeed {
    state: Arc<AppState>,
}

impl BroadcastFeed {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl PositionFeed for BroadcastFeed {
    async fn subscribe(&self, provider_id: Uuid) -> Result<PositionStream, FeedError> {
        let rx = self.state.position_tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
            Ok(update) if update.provider_id == provider_id => Some(update),
            // lagged receivers drop missed samples; the snapshot refetch
            // covers the gap
            _ => None,
        });

        Ok(Box::pin(stream))
    }

    async fn snapshot(&self, provider_id: Uuid) -> Result<Option<LocationUpdate>, FeedError> {
        let snapshot = self.state.providers.get(&provider_id).map(|provider| LocationUpdate {
            provider_id,
            location: provider.location,
            server_timestamp: provider.updated_at,
        });

        Ok(snapshot)
    }
}
