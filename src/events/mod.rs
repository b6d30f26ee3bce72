//! Domain events published by the write path.
//!
//! Events travel as a versioned JSON envelope:
//!
//! ```json
//! {"version":1,"event":{"kind":"post_liked","payload":{"postId":"...","authorId":7,"likedBy":3,"createdAt":"..."}}}
//! ```
//!
//! The set of event kinds is closed: consumers `match` on [`DomainEvent`]
//! and every variant is routed to exactly one handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current envelope schema version.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Routing key for [`PostCreated`] events.
pub const POST_CREATED_ROUTING_KEY: &str = "post.created";
/// Routing key for [`PostLiked`] events.
pub const POST_LIKED_ROUTING_KEY: &str = "post.liked";

/// Errors decoding an event envelope.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported event schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// A post was stored in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreated {
    pub id: String,
    pub author_id: i32,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A user liked a post for the first time.
///
/// `author_id` is the author of the post, carried so the leaderboard can
/// aggregate without joining back to the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostLiked {
    pub post_id: String,
    pub author_id: i32,
    pub liked_by: i32,
    pub created_at: DateTime<Utc>,
}

/// Event kind discriminator, used for subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PostCreated,
    PostLiked,
}

impl EventKind {
    /// Broker routing key for this kind.
    pub fn routing_key(&self) -> &'static str {
        match self {
            EventKind::PostCreated => POST_CREATED_ROUTING_KEY,
            EventKind::PostLiked => POST_LIKED_ROUTING_KEY,
        }
    }

    /// All kinds, in subscription order.
    pub fn all() -> [EventKind; 2] {
        [EventKind::PostCreated, EventKind::PostLiked]
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.routing_key())
    }
}

/// Sealed set of domain events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum DomainEvent {
    PostCreated(PostCreated),
    PostLiked(PostLiked),
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::PostCreated(_) => EventKind::PostCreated,
            DomainEvent::PostLiked(_) => EventKind::PostLiked,
        }
    }

    /// Id of the post this event is about.
    pub fn post_id(&self) -> &str {
        match self {
            DomainEvent::PostCreated(e) => &e.id,
            DomainEvent::PostLiked(e) => &e.post_id,
        }
    }
}

impl From<PostCreated> for DomainEvent {
    fn from(event: PostCreated) -> Self {
        DomainEvent::PostCreated(event)
    }
}

impl From<PostLiked> for DomainEvent {
    fn from(event: PostLiked) -> Self {
        DomainEvent::PostLiked(event)
    }
}

/// Versioned wire envelope around a [`DomainEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub event: DomainEvent,
}

impl EventEnvelope {
    /// Wrap an event at the current schema version.
    pub fn new(event: impl Into<DomainEvent>) -> Self {
        Self {
            version: EVENT_SCHEMA_VERSION,
            event: event.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn routing_key(&self) -> &'static str {
        self.kind().routing_key()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode an envelope, rejecting versions this build does not understand.
    pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
        let envelope: EventEnvelope = serde_json::from_slice(bytes)?;
        if envelope.version != EVENT_SCHEMA_VERSION {
            return Err(EventError::UnsupportedVersion {
                found: envelope.version,
                expected: EVENT_SCHEMA_VERSION,
            });
        }
        Ok(envelope)
    }
}
