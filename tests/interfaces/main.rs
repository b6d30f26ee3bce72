//! Interface tests for search index backends using Cucumber.
//!
//! These tests verify that every search index implementation conforms to the
//! same contract, and that the leaderboard built on top of it behaves the
//! same. Select a backend via environment variable:
//!
//! ```bash
//! # In-memory (default)
//! cargo test --test interfaces
//!
//! # Elasticsearch (uses testcontainers)
//! SEARCH_BACKEND=elasticsearch cargo test --test interfaces
//! ```

mod backend;
mod steps;

use cucumber::World;
use steps::leaderboard::LeaderboardWorld;
use steps::search_index::SearchIndexWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running SearchIndex Interface Tests ===\n");
    SearchIndexWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/search_index.feature")
        .await;

    println!("\n=== Running Leaderboard Interface Tests ===\n");
    LeaderboardWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/leaderboard.feature")
        .await;
}
