//! postdex-denormalizer: search index projection worker
//!
//! Consumes domain events from the event bus and projects them into the
//! search index. One subscriber (and one broker queue) per event kind.
//!
//! ```text
//! [post service] --(PostCreated / PostLiked)--> [event bus] --> [postdex-denormalizer]
//!                                                                      |
//!                                                                      v
//!                                                                search index
//! ```
//!
//! ## Configuration
//! - POSTDEX_CONFIG: Path to a YAML config file (optional)
//! - POSTDEX__SEARCH__URL, POSTDEX__MESSAGING__TYPE, ...: overrides
//! - POSTDEX_LOG: Log filter (default: info)

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use postdex::bus::init_event_bus;
use postdex::config::Config;
use postdex::events::EventKind;
use postdex::handlers::denormalizer::DENORMALIZER_NAME;
use postdex::handlers::Denormalizer;
use postdex::search::init_search_index;
use postdex::utils::bootstrap::{connect_with_retry, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let index = connect_with_retry("search index", || init_search_index(&config.search)).await?;
    let bus = connect_with_retry("event bus", || init_event_bus(&config.messaging)).await?;

    let cancel = CancellationToken::new();
    let denormalizer = Denormalizer::new(Arc::clone(&index))
        .with_like_ids(config.pipeline.like_ids)
        .with_cancellation(cancel.clone());

    let mut subscribers = Vec::new();
    for kind in EventKind::all() {
        let name = format!("{DENORMALIZER_NAME}.{kind}");
        let subscriber = bus.create_subscriber(&name, Some(kind)).await?;
        subscriber.subscribe(Box::new(denormalizer.clone())).await?;
        subscriber.start_consuming().await?;
        subscribers.push(subscriber);
    }

    info!(
        subscribers = subscribers.len(),
        like_ids = ?config.pipeline.like_ids,
        "postdex-denormalizer started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    cancel.cancel();

    Ok(())
}
