//! Denormalization consumer.
//!
//! Projects domain events into the search index. Every variant of
//! [`DomainEvent`] is routed to exactly one handler function, and every
//! handler is idempotent under redelivery:
//!
//! - `PostCreated` replaces the indexed post by id.
//! - `PostLiked` puts the indexed like under a deterministic id derived from
//!   `(post_id, liked_by)`.
//!
//! A like may arrive before its post; the leaderboard only reads likes, so
//! nothing waits for ordering.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use crate::bus::{BusError, EventHandler};
use crate::events::{DomainEvent, EventEnvelope, PostCreated, PostLiked};
use crate::search::{IndexedLike, IndexedPost, SearchError, SearchIndex};
use crate::utils::cancel::until_cancelled;

/// Name reported in handler failures.
pub const DENORMALIZER_NAME: &str = "denormalizer";

/// Result type for denormalization.
pub type Result<T> = std::result::Result<T, DenormalizeError>;

#[derive(Debug, thiserror::Error)]
pub enum DenormalizeError {
    #[error("Search index error: {0}")]
    Search(#[from] SearchError),

    #[error("Denormalization cancelled")]
    Cancelled,
}

impl From<DenormalizeError> for BusError {
    fn from(e: DenormalizeError) -> Self {
        BusError::HandlerFailed {
            name: DENORMALIZER_NAME.to_string(),
            message: e.to_string(),
        }
    }
}

/// How indexed likes get their document id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeIdStrategy {
    /// Id derived from `(post_id, liked_by)`; redelivery overwrites.
    #[default]
    Deterministic,
    /// Id assigned by the search store; redelivery appends a duplicate.
    StoreAssigned,
}

/// Projects domain events into the search index.
#[derive(Clone)]
pub struct Denormalizer {
    index: Arc<dyn SearchIndex>,
    like_ids: LikeIdStrategy,
    cancel: CancellationToken,
}

impl Denormalizer {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index,
            like_ids: LikeIdStrategy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_like_ids(mut self, like_ids: LikeIdStrategy) -> Self {
        self.like_ids = like_ids;
        self
    }

    /// Abort in-flight and future invocations once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply one event to the search index.
    pub async fn apply(&self, event: &DomainEvent) -> Result<()> {
        let work = async {
            match event {
                DomainEvent::PostCreated(created) => self.on_post_created(created).await,
                DomainEvent::PostLiked(liked) => self.on_post_liked(liked).await,
            }
        };

        until_cancelled(&self.cancel, work)
            .await
            .unwrap_or(Err(DenormalizeError::Cancelled))
    }

    async fn on_post_created(&self, event: &PostCreated) -> Result<()> {
        let post = IndexedPost::from(event.clone());
        self.index.index_post(&post).await?;
        debug!(post_id = %post.id, author_id = post.author_id, "Indexed post");
        Ok(())
    }

    async fn on_post_liked(&self, event: &PostLiked) -> Result<()> {
        let like = IndexedLike::from(event.clone());
        let id = match self.like_ids {
            LikeIdStrategy::Deterministic => Some(like.document_id()),
            LikeIdStrategy::StoreAssigned => None,
        };

        let stored_id = self.index.index_like(&like, id.as_deref()).await?;
        debug!(
            post_id = %like.post_id,
            liked_by = like.liked_by,
            like_id = %stored_id,
            "Indexed like"
        );
        Ok(())
    }
}

impl EventHandler for Denormalizer {
    fn handle(
        &self,
        event: Arc<EventEnvelope>,
    ) -> BoxFuture<'static, std::result::Result<(), BusError>> {
        let this = self.clone();
        let span = tracing::info_span!(
            "denormalizer.handle",
            kind = %event.kind(),
            post_id = %event.event.post_id()
        );

        Box::pin(
            async move {
                this.apply(&event.event).await?;
                Ok(())
            }
            .instrument(span),
        )
    }
}
