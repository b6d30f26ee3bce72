//! Test utilities and mock handlers.
//!
//! Shared by unit tests and, through the `test-utils` feature, by the
//! integration test binaries.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;

use crate::bus::{BusError, EventHandler};
use crate::events::{EventEnvelope, PostCreated, PostLiked};

/// Handler that counts invocations and always succeeds.
#[derive(Default)]
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before counting each event.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Shared counter, readable after the handler is boxed.
    pub fn count(&self) -> Arc<AtomicUsize> {
        self.count.clone()
    }
}

impl EventHandler for CountingHandler {
    fn handle(&self, _event: Arc<EventEnvelope>) -> BoxFuture<'static, Result<(), BusError>> {
        let count = self.count.clone();
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Handler that always fails.
pub struct FailingHandler;

impl EventHandler for FailingHandler {
    fn handle(&self, _event: Arc<EventEnvelope>) -> BoxFuture<'static, Result<(), BusError>> {
        Box::pin(async {
            Err(BusError::HandlerFailed {
                name: "failing".to_string(),
                message: "always fails".to_string(),
            })
        })
    }
}

/// Handler that fails the first `fail_times` invocations, then succeeds.
///
/// `u32::MAX` fails forever.
pub struct FlakyHandler {
    fail_times: u32,
    attempts: Arc<AtomicU32>,
}

impl FlakyHandler {
    pub fn new(fail_times: u32) -> Self {
        Self {
            fail_times,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Shared attempt counter.
    pub fn attempts(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }
}

impl EventHandler for FlakyHandler {
    fn handle(&self, _event: Arc<EventEnvelope>) -> BoxFuture<'static, Result<(), BusError>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_times == u32::MAX || attempt < self.fail_times;
        Box::pin(async move {
            if fail {
                Err(BusError::HandlerFailed {
                    name: "flaky".to_string(),
                    message: format!("attempt {} failed", attempt + 1),
                })
            } else {
                Ok(())
            }
        })
    }
}

/// Midnight UTC on the given day of March 2024.
pub fn at_day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid test day {day}"))
}

pub fn sample_post_created(id: &str, author_id: i32) -> PostCreated {
    PostCreated {
        id: id.to_string(),
        author_id,
        title: format!("Post {id}"),
        content: format!("Content of post {id} by user {author_id}"),
        created_at: at_day(1),
    }
}

pub fn sample_post_liked(post_id: &str, author_id: i32, liked_by: i32) -> PostLiked {
    PostLiked {
        post_id: post_id.to_string(),
        author_id,
        liked_by,
        created_at: at_day(2),
    }
}
