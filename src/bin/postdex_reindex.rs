//! postdex-reindex: one-shot rebuild of the search projections
//!
//! Reads every post from the content store and writes the indexed posts and
//! likes in bulk. Safe to re-run; likes are written under deterministic ids.
//!
//! ## Configuration
//! - POSTDEX_CONFIG: Path to a YAML config file (optional)
//! - POSTDEX__STORAGE__URI, POSTDEX__SEARCH__URL, ...: overrides
//! - POSTDEX_LOG: Log filter (default: info)

use tokio_util::sync::CancellationToken;
use tracing::info;

use postdex::config::Config;
use postdex::search::init_search_index;
use postdex::services::Reindexer;
use postdex::storage::init_post_store;
use postdex::utils::bootstrap::{connect_with_retry, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let store = connect_with_retry("content store", || init_post_store(&config.storage)).await?;
    let index = connect_with_retry("search index", || init_search_index(&config.search)).await?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let summary = Reindexer::new(store, index).run(&cancel).await?;
    info!(
        posts = summary.posts,
        likes = summary.likes,
        "postdex-reindex finished"
    );

    Ok(())
}
