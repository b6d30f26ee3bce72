//! Postdex - event-driven denormalization of posts and likes.
//!
//! The write path stores posts in a content store and publishes domain
//! events. A denormalizer consumes them into a search index, and the
//! analytics aggregator turns indexed likes into an author leaderboard
//! joined with the user directory.

pub mod analytics;
pub mod bus;
pub mod config;
pub mod events;
pub mod handlers;
pub mod search;
pub mod services;
pub mod storage;
pub mod users;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
