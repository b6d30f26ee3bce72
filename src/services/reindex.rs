//! Rebuild of the search projections from the content store.
//!
//! Used for bulk seeding and to recover an index that fell behind. Likes
//! are written under their deterministic ids, so a retried or repeated run
//! converges on the same documents.

use std::sync::Arc;

use backon::Retryable;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::search::{IndexedLike, IndexedPost, SearchError, SearchIndex};
use crate::storage::{PostStore, StorageError};
use crate::utils::cancel::until_cancelled;
use crate::utils::retry::seed_backoff;

pub type Result<T> = std::result::Result<T, ReindexError>;

#[derive(Debug, thiserror::Error)]
pub enum ReindexError {
    #[error("Content store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Search index error: {0}")]
    Search(#[from] SearchError),

    #[error("Reindex cancelled")]
    Cancelled,
}

/// Documents written by one reindex run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexSummary {
    pub posts: usize,
    pub likes: usize,
}

pub struct Reindexer {
    store: Arc<dyn PostStore>,
    index: Arc<dyn SearchIndex>,
}

impl Reindexer {
    pub fn new(store: Arc<dyn PostStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { store, index }
    }

    /// Reindex everything, retrying the whole run with a fixed delay.
    #[instrument(name = "reindex.run", skip_all)]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ReindexSummary> {
        let attempt = || self.run_once();
        let retried = attempt.retry(seed_backoff()).notify(|e: &ReindexError, delay| {
            warn!(
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "Reindex failed, retrying"
            );
        });

        let summary = until_cancelled(cancel, retried)
            .await
            .unwrap_or(Err(ReindexError::Cancelled))?;

        info!(posts = summary.posts, likes = summary.likes, "Reindex complete");
        Ok(summary)
    }

    /// One reindex pass without retry.
    pub async fn run_once(&self) -> Result<ReindexSummary> {
        self.index.setup().await?;

        let posts = self.store.list_all().await?;
        let indexed: Vec<IndexedPost> = posts.iter().filter_map(IndexedPost::from_post).collect();
        let likes: Vec<IndexedLike> = posts.iter().flat_map(IndexedLike::from_post).collect();

        self.index.index_posts(&indexed).await?;
        self.index.index_likes(&likes).await?;

        Ok(ReindexSummary {
            posts: indexed.len(),
            likes: likes.len(),
        })
    }
}
