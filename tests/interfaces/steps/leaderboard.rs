//! Leaderboard step definitions.
//!
//! Likes go straight into the search index; users into an in-memory
//! directory. The aggregation under test is the backend's.

use std::sync::Arc;

use cucumber::{gherkin::Step, given, then, when, World};
use postdex::analytics::{AnalyticsAggregator, LeaderboardEntry};
use postdex::search::{IndexedLike, LeaderboardRange};
use postdex::users::{MemoryUserDirectory, User};
use tokio_util::sync::CancellationToken;

use super::{parse_date, parse_day};
use crate::backend::{SearchBackend, SearchContext};

/// Test context for leaderboard scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct LeaderboardWorld {
    backend: SearchBackend,
    context: Option<SearchContext>,
    users: Vec<User>,
    leaderboard: Vec<LeaderboardEntry>,
}

impl LeaderboardWorld {
    fn new() -> Self {
        Self {
            backend: SearchBackend::from_env(),
            context: None,
            users: Vec::new(),
            leaderboard: Vec::new(),
        }
    }

    fn context(&self) -> &SearchContext {
        self.context
            .as_ref()
            .expect("Search context not initialized")
    }

    async fn compute(&mut self, range: LeaderboardRange) {
        let users = Arc::new(MemoryUserDirectory::with_users(self.users.clone()));
        let aggregator = AnalyticsAggregator::new(self.context().index.clone(), users);
        self.leaderboard = aggregator
            .leaderboard(&range, &CancellationToken::new())
            .await
            .expect("Leaderboard failed");
    }
}

// --- Background ---

#[given("a SearchIndex backend")]
async fn given_search_index_backend(world: &mut LeaderboardWorld) {
    println!("Using backend: {}", world.backend.name());
    world.context = Some(SearchContext::new(world.backend).await);
}

#[given("the users:")]
async fn given_users(world: &mut LeaderboardWorld, step: &Step) {
    if let Some(table) = step.table.as_ref() {
        for row in table.rows.iter().skip(1) {
            let user_id: i32 = row[0].parse().expect("Invalid user id");
            world.users.push(User::new(user_id, &row[1], &row[2]));
        }
    }
}

// --- Given steps ---

#[given("the likes:")]
async fn given_likes(world: &mut LeaderboardWorld, step: &Step) {
    let mut likes = Vec::new();
    if let Some(table) = step.table.as_ref() {
        for row in table.rows.iter().skip(1) {
            likes.push(IndexedLike {
                post_id: row[0].clone(),
                author_id: row[1].parse().expect("Invalid author id"),
                liked_by: row[2].parse().expect("Invalid liker id"),
                created_at: parse_day(&row[3]),
            });
        }
    }

    world
        .context()
        .index
        .index_likes(&likes)
        .await
        .expect("Failed to index likes");
}

// --- When steps ---

#[when("I compute the leaderboard")]
async fn when_compute(world: &mut LeaderboardWorld) {
    world.compute(LeaderboardRange::all()).await;
}

#[when(expr = "I compute the leaderboard from {string} to {string}")]
async fn when_compute_between(world: &mut LeaderboardWorld, start: String, end: String) {
    world
        .compute(LeaderboardRange::between(parse_date(&start), parse_date(&end)))
        .await;
}

// --- Then steps ---

#[then("the leaderboard is:")]
async fn then_leaderboard_is(world: &mut LeaderboardWorld, step: &Step) {
    let mut expected = Vec::new();
    if let Some(table) = step.table.as_ref() {
        for row in table.rows.iter().skip(1) {
            let user_id: i32 = row[0].parse().expect("Invalid user id");
            let like_count: u64 = row[2].parse().expect("Invalid like count");
            expected.push((user_id, row[1].clone(), like_count));
        }
    }

    let actual: Vec<(i32, String, u64)> = world
        .leaderboard
        .iter()
        .map(|e| (e.user_id, e.name.clone(), e.like_count))
        .collect();
    assert_eq!(actual, expected);
}

#[then(expr = "the leaderboard has {int} entries")]
async fn then_entry_count(world: &mut LeaderboardWorld, count: usize) {
    assert_eq!(world.leaderboard.len(), count);
}

#[then(expr = "the leaderboard starts with user {int} with {int} likes")]
async fn then_first_entry(world: &mut LeaderboardWorld, user_id: i32, like_count: u64) {
    let first = world.leaderboard.first().expect("Empty leaderboard");
    assert_eq!(first.user_id, user_id);
    assert_eq!(first.like_count, like_count);
}
