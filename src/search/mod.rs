//! Search/analytics index holding the denormalized projections.
//!
//! This module contains:
//! - `SearchIndex` trait: indexing, deletion, full-text search, leaderboard
//! - Projection types (`IndexedPost`, `IndexedLike`) and the leaderboard range
//! - Search configuration and factory
//! - Implementations: in-memory (synchronous), Elasticsearch (REST)

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::events::{PostCreated, PostLiked};
use crate::storage::Post;

pub mod elastic;
pub mod memory;

pub use elastic::ElasticSearchIndex;
pub use memory::MemorySearchIndex;

/// Index holding [`IndexedPost`] documents.
pub const POSTS_INDEX: &str = "posts";
/// Index holding [`IndexedLike`] documents.
pub const LIKES_INDEX: &str = "likes";
/// Maximum number of hits returned by [`SearchIndex::search_posts`].
pub const SEARCH_WINDOW: usize = 10;
/// Maximum number of authors returned by [`SearchIndex::analytics_leaderboard`].
pub const LEADERBOARD_SIZE: usize = 5;

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur talking to the search index.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The store answered with a non-success status.
    #[error("Search store returned {status}: {body}")]
    Store { status: u16, body: String },

    #[error("Search transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Undecodable search response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid search configuration: {0}")]
    Config(String),

    #[error("Search index unavailable: {0}")]
    Unavailable(String),
}

/// Search projection of a post. Carries no likes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedPost {
    pub id: String,
    pub author_id: i32,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl IndexedPost {
    /// Project a stored post. `None` if the post was never saved.
    pub fn from_post(post: &Post) -> Option<Self> {
        post.created_event().map(Self::from)
    }
}

impl From<PostCreated> for IndexedPost {
    fn from(event: PostCreated) -> Self {
        Self {
            id: event.id,
            author_id: event.author_id,
            title: event.title,
            content: event.content,
            created_at: event.created_at,
        }
    }
}

/// Search projection of a like.
///
/// `author_id` is the author of the liked post, not the liker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedLike {
    pub post_id: String,
    pub author_id: i32,
    pub liked_by: i32,
    pub created_at: DateTime<Utc>,
}

impl IndexedLike {
    /// Deterministic document id for this like. See [`like_document_id`].
    pub fn document_id(&self) -> String {
        like_document_id(&self.post_id, self.liked_by)
    }

    /// One like per liker of a stored post, dated at the post's creation.
    ///
    /// The content store keeps no per-like timestamp.
    pub fn from_post(post: &Post) -> Vec<Self> {
        let Some(post_id) = post.id.as_deref() else {
            return Vec::new();
        };
        post.likes()
            .iter()
            .map(|&liked_by| Self {
                post_id: post_id.to_string(),
                author_id: post.author_id,
                liked_by,
                created_at: post.created_at,
            })
            .collect()
    }
}

impl From<PostLiked> for IndexedLike {
    fn from(event: PostLiked) -> Self {
        Self {
            post_id: event.post_id,
            author_id: event.author_id,
            liked_by: event.liked_by,
            created_at: event.created_at,
        }
    }
}

/// Document id for the like of `post_id` by `liked_by`.
///
/// Same pair, same id: indexing a redelivered like overwrites instead of
/// appending.
pub fn like_document_id(post_id: &str, liked_by: i32) -> String {
    let name = format!("{post_id}:{liked_by}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
        .simple()
        .to_string()
}

/// Optional inclusive day range for the leaderboard.
///
/// The range only applies when both bounds are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaderboardRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl LeaderboardRange {
    /// No restriction.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Build from timestamps, keeping only their UTC day.
    pub fn from_timestamps(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start: start.map(|t| t.date_naive()),
            end: end.map(|t| t.date_naive()),
        }
    }

    /// Both bounds, or `None` when the range is unrestricted.
    pub fn day_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.start?, self.end?))
    }

    /// True if `at` falls inside the range.
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        match self.day_bounds() {
            Some((start, end)) => {
                let day = at.date_naive();
                start <= day && day <= end
            }
            None => true,
        }
    }
}

/// Author id → like count.
pub type Leaderboard = BTreeMap<i32, u64>;

/// Interface to the search/analytics store.
///
/// Writes are replace-by-id wherever an id is known, so re-applying the same
/// projection is harmless.
///
/// Implementations:
/// - `MemorySearchIndex`: in-process, writes visible immediately
/// - `ElasticSearchIndex`: Elasticsearch REST API
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the `posts` and `likes` indices if absent. Idempotent.
    async fn setup(&self) -> Result<()>;

    /// Index or replace a post by its id.
    async fn index_post(&self, post: &IndexedPost) -> Result<()>;

    /// Index a like and return its document id.
    ///
    /// With `None` the store assigns the id, so indexing the same like twice
    /// produces two documents. With `Some(id)` the document is put by id.
    async fn index_like(&self, like: &IndexedLike, id: Option<&str>) -> Result<String>;

    /// Bulk variant of [`SearchIndex::index_post`].
    async fn index_posts(&self, posts: &[IndexedPost]) -> Result<()>;

    /// Bulk index likes by their deterministic ids.
    async fn index_likes(&self, likes: &[IndexedLike]) -> Result<()>;

    /// Posts whose title matches `title_term` or whose content matches
    /// `content_term`, best match first, at most [`SEARCH_WINDOW`].
    async fn search_posts(&self, title_term: &str, content_term: &str)
        -> Result<Vec<IndexedPost>>;

    /// Like counts per post author, at most [`LEADERBOARD_SIZE`] authors.
    async fn analytics_leaderboard(&self, range: &LeaderboardRange) -> Result<Leaderboard>;

    /// Remove a post. Missing posts are not an error.
    async fn delete_post(&self, id: &str) -> Result<()>;

    async fn get_post(&self, id: &str) -> Result<Option<IndexedPost>>;

    /// Remove every like of a post, returning how many were removed.
    async fn delete_likes_for_post(&self, post_id: &str) -> Result<u64>;

    async fn count_likes_for_post(&self, post_id: &str) -> Result<u64>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Search backend discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Memory,
    Elasticsearch,
}

/// When Elasticsearch writes become visible to search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Visible after the next periodic refresh.
    #[default]
    Off,
    /// Writes return once visible.
    WaitFor,
    /// Force a refresh on every write.
    Immediate,
}

impl RefreshPolicy {
    /// Value of the `refresh` query parameter for single-document writes.
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            RefreshPolicy::Off => None,
            RefreshPolicy::WaitFor => Some("wait_for"),
            RefreshPolicy::Immediate => Some("true"),
        }
    }
}

/// Search index configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    #[serde(rename = "type")]
    pub search_type: SearchType,
    /// Elasticsearch base URL.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh: RefreshPolicy,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_type: SearchType::Memory,
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            refresh: RefreshPolicy::Off,
            timeout_secs: 30,
        }
    }
}

/// Initialize the search index based on configuration, creating the
/// indices if needed.
pub async fn init_search_index(config: &SearchConfig) -> Result<Arc<dyn SearchIndex>> {
    let index: Arc<dyn SearchIndex> = match config.search_type {
        SearchType::Memory => Arc::new(MemorySearchIndex::new()),
        SearchType::Elasticsearch => Arc::new(ElasticSearchIndex::from_config(config)?),
    };

    index.setup().await?;
    info!(search_type = ?config.search_type, "Search index initialized");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_like_document_id_is_stable_per_pair() {
        assert_eq!(like_document_id("p1", 1), like_document_id("p1", 1));
        assert_ne!(like_document_id("p1", 1), like_document_id("p1", 2));
        assert_ne!(like_document_id("p1", 1), like_document_id("p2", 1));
    }

    #[test]
    fn test_range_requires_both_bounds() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let half_open = LeaderboardRange {
            start: Some(day),
            end: None,
        };
        assert!(half_open.day_bounds().is_none());
        assert!(half_open.contains(&at(1, 0)));
    }

    #[test]
    fn test_range_is_inclusive_by_day() {
        let range = LeaderboardRange::between(
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
        );
        assert!(range.contains(&at(10, 0)));
        assert!(range.contains(&at(12, 23)));
        assert!(!range.contains(&at(9, 23)));
        assert!(!range.contains(&at(13, 0)));
    }

    #[test]
    fn test_indexed_likes_from_post() {
        let post = Post::new(7, "t", "c", at(1, 0))
            .with_id("p1")
            .with_likes([1, 2]);
        let likes = IndexedLike::from_post(&post);
        assert_eq!(likes.len(), 2);
        assert!(likes.iter().all(|l| l.author_id == 7 && l.post_id == "p1"));

        assert!(IndexedLike::from_post(&Post::new(7, "t", "c", at(1, 0))).is_empty());
    }

    #[test]
    fn test_refresh_param() {
        assert_eq!(RefreshPolicy::Off.as_param(), None);
        assert_eq!(RefreshPolicy::WaitFor.as_param(), Some("wait_for"));
    }
}
