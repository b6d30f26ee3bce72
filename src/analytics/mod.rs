//! Analytics aggregation over the search index.
//!
//! The leaderboard asks the search index for per-author like counts, then
//! joins the author ids against the user directory.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::search::{LeaderboardRange, SearchError, SearchIndex};
use crate::users::{UserDirectory, UserStoreError};
use crate::utils::cancel::until_cancelled;

/// Result type for analytics queries.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Search index error: {0}")]
    Search(#[from] SearchError),

    #[error("User store error: {0}")]
    Users(#[from] UserStoreError),

    #[error("Analytics query cancelled")]
    Cancelled,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: i32,
    pub name: String,
    pub email: String,
    pub like_count: u64,
}

/// Joins search-index aggregations with user records.
#[derive(Clone)]
pub struct AnalyticsAggregator {
    index: Arc<dyn SearchIndex>,
    users: Arc<dyn UserDirectory>,
}

impl AnalyticsAggregator {
    pub fn new(index: Arc<dyn SearchIndex>, users: Arc<dyn UserDirectory>) -> Self {
        Self { index, users }
    }

    /// Authors with the most likes, most liked first.
    ///
    /// Ties are ordered by ascending user id. Authors with no user record
    /// are left out.
    #[instrument(name = "analytics.leaderboard", skip_all, fields(start = ?range.start, end = ?range.end))]
    pub async fn leaderboard(
        &self,
        range: &LeaderboardRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<LeaderboardEntry>> {
        until_cancelled(cancel, self.compute(range))
            .await
            .unwrap_or(Err(AnalyticsError::Cancelled))
    }

    async fn compute(&self, range: &LeaderboardRange) -> Result<Vec<LeaderboardEntry>> {
        let counts = self.index.analytics_leaderboard(range).await?;
        if counts.is_empty() {
            return Ok(Vec::new());
        }

        let author_ids: Vec<i32> = counts.keys().copied().collect();
        let users = self.users.get_users_by_ids(&author_ids).await?;

        if users.len() < author_ids.len() {
            debug!(
                authors = author_ids.len(),
                users = users.len(),
                "Dropping leaderboard authors without a user record"
            );
        }

        let mut entries: Vec<LeaderboardEntry> = users
            .into_iter()
            .filter_map(|user| {
                let like_count = *counts.get(&user.user_id)?;
                Some(LeaderboardEntry {
                    user_id: user.user_id,
                    name: user.name,
                    email: user.email,
                    like_count,
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            b.like_count
                .cmp(&a.like_count)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(entries)
    }
}
