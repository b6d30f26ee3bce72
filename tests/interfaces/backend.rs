//! Backend factory for interface tests.
//!
//! Provides a unified way to create search index backends based on
//! environment configuration.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use postdex::search::{
    ElasticSearchIndex, MemorySearchIndex, RefreshPolicy, SearchConfig, SearchIndex, SearchType,
};
use postdex::utils::bootstrap::connect_with_retry;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

const ELASTICSEARCH_IMAGE: &str = "docker.elastic.co/elasticsearch/elasticsearch";
const ELASTICSEARCH_TAG: &str = "8.13.4";

/// Search backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Memory,
    Elasticsearch,
}

impl SearchBackend {
    pub fn from_env() -> Self {
        match env::var("SEARCH_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "elasticsearch" | "elastic" => SearchBackend::Elasticsearch,
            _ => SearchBackend::Memory,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchBackend::Memory => "memory",
            SearchBackend::Elasticsearch => "elasticsearch",
        }
    }
}

/// Holds the search index for a backend, plus the container serving it.
pub struct SearchContext {
    pub index: Arc<dyn SearchIndex>,
    /// Container handle to keep container alive.
    #[allow(dead_code)]
    container: Option<ContainerAsync<GenericImage>>,
}

impl std::fmt::Debug for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("index", &"<dyn SearchIndex>")
            .field("container", &self.container.is_some())
            .finish()
    }
}

impl SearchContext {
    /// Create a search context for the configured backend.
    pub async fn new(backend: SearchBackend) -> Self {
        match backend {
            SearchBackend::Memory => Self::create_memory(),
            SearchBackend::Elasticsearch => Self::create_elasticsearch().await,
        }
    }

    fn create_memory() -> Self {
        SearchContext {
            index: Arc::new(MemorySearchIndex::new()),
            container: None,
        }
    }

    async fn create_elasticsearch() -> Self {
        let image = GenericImage::new(ELASTICSEARCH_IMAGE, ELASTICSEARCH_TAG)
            .with_exposed_port(9200.tcp())
            .with_wait_for(WaitFor::message_on_stdout("started"));

        let container = image
            .with_env_var("discovery.type", "single-node")
            .with_env_var("xpack.security.enabled", "false")
            .with_env_var("ES_JAVA_OPTS", "-Xms512m -Xmx512m")
            .with_startup_timeout(Duration::from_secs(180))
            .start()
            .await
            .expect("Failed to start Elasticsearch container");

        let host = container.get_host().await.expect("Failed to get host");
        let host_port = container
            .get_host_port_ipv4(9200)
            .await
            .expect("Failed to get port");

        let config = SearchConfig {
            search_type: SearchType::Elasticsearch,
            url: format!("http://{}:{}", host, host_port),
            refresh: RefreshPolicy::WaitFor,
            ..SearchConfig::default()
        };

        let index = ElasticSearchIndex::from_config(&config).expect("Invalid search config");
        connect_with_retry("elasticsearch", || index.setup())
            .await
            .expect("Failed to create indices");

        SearchContext {
            index: Arc::new(index),
            container: Some(container),
        }
    }
}
