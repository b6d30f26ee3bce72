//! In-memory search index.
//!
//! Writes are visible as soon as the call returns. Relevance is the number
//! of query tokens found in the matched field, which is enough to exercise
//! ranking and the OR semantics of [`SearchIndex::search_posts`].

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    IndexedLike, IndexedPost, Leaderboard, LeaderboardRange, Result, SearchError, SearchIndex,
    LEADERBOARD_SIZE, SEARCH_WINDOW,
};

/// In-memory search index.
#[derive(Default)]
pub struct MemorySearchIndex {
    posts: RwLock<HashMap<String, IndexedPost>>,
    likes: RwLock<HashMap<String, IndexedLike>>,
    fail_on_write: RwLock<bool>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn post_count(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn like_count(&self) -> usize {
        self.likes.read().await.len()
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(SearchError::Unavailable("Mock write failure".to_string()));
        }
        Ok(())
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Number of distinct query tokens present in `field`.
fn score(query: &str, field: &str) -> usize {
    let query = tokens(query);
    if query.is_empty() {
        return 0;
    }
    let field = tokens(field);
    query.iter().filter(|t| field.contains(*t)).count()
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn index_post(&self, post: &IndexedPost) -> Result<()> {
        self.check_write().await?;
        self.posts
            .write()
            .await
            .insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn index_like(&self, like: &IndexedLike, id: Option<&str>) -> Result<String> {
        self.check_write().await?;
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        self.likes.write().await.insert(id.clone(), like.clone());
        Ok(id)
    }

    async fn index_posts(&self, posts: &[IndexedPost]) -> Result<()> {
        self.check_write().await?;
        let mut stored = self.posts.write().await;
        for post in posts {
            stored.insert(post.id.clone(), post.clone());
        }
        Ok(())
    }

    async fn index_likes(&self, likes: &[IndexedLike]) -> Result<()> {
        self.check_write().await?;
        let mut stored = self.likes.write().await;
        for like in likes {
            stored.insert(like.document_id(), like.clone());
        }
        Ok(())
    }

    async fn search_posts(
        &self,
        title_term: &str,
        content_term: &str,
    ) -> Result<Vec<IndexedPost>> {
        let posts = self.posts.read().await;
        let mut hits: Vec<(usize, &IndexedPost)> = posts
            .values()
            .map(|p| (score(title_term, &p.title) + score(content_term, &p.content), p))
            .filter(|(score, _)| *score > 0)
            .collect();

        hits.sort_by(|(a_score, a), (b_score, b)| {
            b_score.cmp(a_score).then_with(|| a.id.cmp(&b.id))
        });

        Ok(hits
            .into_iter()
            .take(SEARCH_WINDOW)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn analytics_leaderboard(&self, range: &LeaderboardRange) -> Result<Leaderboard> {
        let likes = self.likes.read().await;
        let mut counts: HashMap<i32, u64> = HashMap::new();
        for like in likes.values().filter(|l| range.contains(&l.created_at)) {
            *counts.entry(like.author_id).or_default() += 1;
        }

        let mut buckets: Vec<(i32, u64)> = counts.into_iter().collect();
        buckets.sort_by(|(a_author, a_count), (b_author, b_count)| {
            b_count.cmp(a_count).then_with(|| a_author.cmp(b_author))
        });

        Ok(buckets.into_iter().take(LEADERBOARD_SIZE).collect())
    }

    async fn delete_post(&self, id: &str) -> Result<()> {
        self.check_write().await?;
        self.posts.write().await.remove(id);
        Ok(())
    }

    async fn get_post(&self, id: &str) -> Result<Option<IndexedPost>> {
        Ok(self.posts.read().await.get(id).cloned())
    }

    async fn delete_likes_for_post(&self, post_id: &str) -> Result<u64> {
        self.check_write().await?;
        let mut likes = self.likes.write().await;
        let before = likes.len();
        likes.retain(|_, like| like.post_id != post_id);
        Ok((before - likes.len()) as u64)
    }

    async fn count_likes_for_post(&self, post_id: &str) -> Result<u64> {
        let likes = self.likes.read().await;
        Ok(likes.values().filter(|l| l.post_id == post_id).count() as u64)
    }
}

#[cfg(test)]
mod tests;
