//! Post write path and search read path.
//!
//! New posts go to the content store first so the event can carry the
//! assigned id. Likes publish `PostLiked` before the like is stored. The search index is only written directly on delete, where no
//! event exists to carry the cleanup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::bus::{BusError, EventBus};
use crate::events::EventEnvelope;
use crate::search::{SearchError, SearchIndex};
use crate::storage::{Post, PostStore, StorageError};
use crate::utils::cancel::until_cancelled;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Content store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Search index error: {0}")]
    Search(#[from] SearchError),

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn PostStore>,
    bus: Arc<dyn EventBus>,
    index: Arc<dyn SearchIndex>,
    cancel: CancellationToken,
}

impl PostService {
    pub fn new(
        store: Arc<dyn PostStore>,
        bus: Arc<dyn EventBus>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            store,
            bus,
            index,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn guarded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        until_cancelled(&self.cancel, work)
            .await
            .unwrap_or(Err(ServiceError::Cancelled))
    }

    /// Store a new post and publish `PostCreated`.
    #[instrument(name = "posts.create", skip_all, fields(author_id = author_id))]
    pub async fn create_post(
        &self,
        author_id: i32,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Post> {
        let post = Post::new(author_id, title, content, Utc::now());
        self.guarded(async {
            let stored = self.store.create(post).await?;
            let event = stored.created_event().ok_or(StorageError::MissingId)?;
            self.bus.publish(Arc::new(EventEnvelope::new(event))).await?;
            info!(post_id = ?stored.id, "Created post");
            Ok(stored)
        })
        .await
    }

    /// Like a post. `None` if the post does not exist, otherwise whether the
    /// like was new. `PostLiked` is only published for new likes, and is
    /// published before the like is stored.
    #[instrument(name = "posts.like", skip(self))]
    pub async fn like_post(&self, post_id: &str, user_id: i32) -> Result<Option<bool>> {
        self.guarded(async {
            let Some(mut post) = self.store.get_by_id(post_id).await? else {
                return Ok(None);
            };

            let is_new = post.like(user_id);
            // Publish before storing so a failed publish leaves the like
            // unstored and a retry publishes it again.
            if is_new {
                let event = post
                    .liked_event(user_id, Utc::now())
                    .ok_or(StorageError::MissingId)?;
                self.bus.publish(Arc::new(EventEnvelope::new(event))).await?;
            }
            self.store.create(post).await?;

            debug!(is_new, "Liked post");
            Ok(Some(is_new))
        })
        .await
    }

    /// Remove a like. `None` if the post does not exist, otherwise whether
    /// a like was removed. No event is published.
    #[instrument(name = "posts.unlike", skip(self))]
    pub async fn unlike_post(&self, post_id: &str, user_id: i32) -> Result<Option<bool>> {
        self.guarded(async {
            let Some(mut post) = self.store.get_by_id(post_id).await? else {
                return Ok(None);
            };

            let removed = post.remove_like(user_id);
            self.store.create(post).await?;
            Ok(Some(removed))
        })
        .await
    }

    /// Delete a post with its indexed projection and indexed likes.
    /// Returns `false` if the post does not exist.
    #[instrument(name = "posts.delete", skip(self))]
    pub async fn delete_post(&self, post_id: &str) -> Result<bool> {
        self.guarded(async {
            let Some(post) = self.store.get_by_id(post_id).await? else {
                return Ok(false);
            };

            self.store.delete(&post).await?;
            self.index.delete_post(post_id).await?;
            let likes = self.index.delete_likes_for_post(post_id).await?;
            info!(likes_removed = likes, "Deleted post");
            Ok(true)
        })
        .await
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        self.guarded(async { Ok(self.store.get_by_id(post_id).await?) })
            .await
    }

    pub async fn author_posts(&self, author_id: i32) -> Result<Vec<Post>> {
        self.guarded(async { Ok(self.store.get_by_author(author_id).await?) })
            .await
    }

    /// Full-text search over titles and contents, returning full posts in
    /// rank order. Hits no longer in the content store are dropped.
    #[instrument(name = "posts.search", skip(self))]
    pub async fn search_posts(&self, query: &str) -> Result<Vec<Post>> {
        self.guarded(async {
            let hits = self.index.search_posts(query, query).await?;
            let ids: Vec<String> = hits.into_iter().map(|hit| hit.id).collect();

            let mut found: HashMap<String, Post> = self
                .store
                .get_by_ids(&ids)
                .await?
                .into_iter()
                .filter_map(|post| Some((post.id.clone()?, post)))
                .collect();

            Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
        })
        .await
    }
}
