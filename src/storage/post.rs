//! Canonical post document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{PostCreated, PostLiked};

/// A post as stored in the content store.
///
/// `likes` is a set of user ids kept in insertion order; it never holds
/// duplicates. It is only mutated through [`Post::like`] and
/// [`Post::remove_like`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Assigned by the content store on first write.
    pub id: Option<String>,
    pub author_id: i32,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    likes: Vec<i32>,
}

impl Post {
    /// Create an unsaved post with no likes.
    pub fn new(
        author_id: i32,
        title: impl Into<String>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            author_id,
            title: title.into(),
            content: content.into(),
            created_at,
            likes: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Replace the like set, dropping repeated user ids.
    pub fn with_likes(mut self, likes: impl IntoIterator<Item = i32>) -> Self {
        self.likes.clear();
        for user_id in likes {
            self.like(user_id);
        }
        self
    }

    pub fn likes(&self) -> &[i32] {
        &self.likes
    }

    pub fn is_liked_by(&self, user_id: i32) -> bool {
        self.likes.contains(&user_id)
    }

    /// Record a like. Returns `true` if the user had not liked the post yet.
    pub fn like(&mut self, user_id: i32) -> bool {
        if self.is_liked_by(user_id) {
            return false;
        }
        self.likes.push(user_id);
        true
    }

    /// Remove a like. Returns `true` if a like was removed.
    pub fn remove_like(&mut self, user_id: i32) -> bool {
        let before = self.likes.len();
        self.likes.retain(|&u| u != user_id);
        self.likes.len() != before
    }

    /// Build the creation event. `None` until the post has an id.
    pub fn created_event(&self) -> Option<PostCreated> {
        let id = self.id.clone()?;
        Some(PostCreated {
            id,
            author_id: self.author_id,
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        })
    }

    /// Build the like event for `liked_by`. `None` until the post has an id.
    pub fn liked_event(&self, liked_by: i32, at: DateTime<Utc>) -> Option<PostLiked> {
        let post_id = self.id.clone()?;
        Some(PostLiked {
            post_id,
            author_id: self.author_id,
            liked_by,
            created_at: at,
        })
    }
}
