//! Application state wiring the memory service to its infra implementations.
//!
//! `MemoryService` is generic over store, embedder, scorer, and enricher;
//! AppState pins those to the SQLite store, the configured embedder, the
//! lexical scorer, and metadata-overlap enrichment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use memoria_core::memory::box_embedder::BoxEmbedder;
use memoria_core::memory::enricher::MetadataOverlapEnricher;
use memoria_core::memory::insight::InsightPolicy;
use memoria_core::memory::scorer::LexicalScorer;
use memoria_core::memory::service::MemoryService;
use memoria_infra::config::load_config;
use memoria_infra::embedding::build_embedder;
use memoria_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use memoria_infra::sqlite::{DatabasePool, SqliteMemoryStore};
use memoria_types::config::MemoriaConfig;

/// Records scanned per owner when looking for related memories.
const ENRICHMENT_SCAN_LIMIT: u32 = 200;

/// Pending derived insights held before new ones are dropped.
const INSIGHT_QUEUE_CAPACITY: usize = 64;

pub type ConcreteMemoryService = MemoryService<
    SqliteMemoryStore,
    BoxEmbedder,
    LexicalScorer,
    MetadataOverlapEnricher<SqliteMemoryStore>,
>;

/// Shared application state for CLI commands and REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub memory_service: Arc<ConcreteMemoryService>,
    pub config: Arc<MemoriaConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Resolve the data directory, load `config.toml`, and open the database.
    ///
    /// `background` enables work that outlives a single command (the
    /// insight worker). One-shot CLI commands pass `false` so the process
    /// never exits with derived writes still queued.
    pub async fn init(background: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_config(&data_dir).await;
        Self::open(&data_dir, config, background).await
    }

    /// Open state rooted at `data_dir` with an explicit config.
    pub async fn open(data_dir: &Path, config: MemoriaConfig, background: bool) -> anyhow::Result<Self> {
        ensure_data_dir(data_dir).await?;

        let db_url = format!("sqlite://{}?mode=rwc", data_dir.join("memoria.db").display());
        let db_pool = DatabasePool::new(&db_url).await?;

        let store = Arc::new(SqliteMemoryStore::new(db_pool.clone()));
        let embedder = Arc::new(build_embedder(&config.embedding)?);
        let enricher = MetadataOverlapEnricher::new(Arc::clone(&store), ENRICHMENT_SCAN_LIMIT);

        let mut service = MemoryService::new(
            Arc::clone(&store),
            embedder,
            LexicalScorer::default(),
            enricher,
            &config,
        );

        if background && config.insight.enabled {
            // The worker exits once the service (and its queue) is dropped.
            let (queue, _worker) =
                InsightPolicy::new(config.insight.clone()).spawn(Arc::clone(&store), INSIGHT_QUEUE_CAPACITY);
            service = service.with_insights(queue);
            tracing::info!("insight derivation enabled");
        }

        Ok(Self {
            memory_service: Arc::new(service),
            config: Arc::new(config),
            data_dir: data_dir.to_path_buf(),
            db_pool,
        })
    }
}
